mod engine;
mod persistence;
mod repository;
mod run;

pub use engine::{start_reminder_workflow, ReminderWorkflow, WorkflowOutcome};
pub use persistence::PgWorkflowRepository;
pub use repository::{InMemoryWorkflowRepository, WorkflowRepository};
pub use run::{AbortReason, PlanSnapshot, RunStatus, StepKey, WorkflowRun};
