use crate::{
    clock::SystemClock,
    configuration::Settings,
    startup::get_connection_pool,
    subscription_store::PgSubscriptionStore,
    workflow::{PgWorkflowRepository, ReminderWorkflow, WorkflowOutcome},
};
use std::{sync::Arc, time::Duration};
use tracing::Span;

pub async fn run_worker_until_stopped(config: Settings) -> Result<(), anyhow::Error> {
    let db_pool = get_connection_pool(&config.database);
    let sink = config.notification_sink.client()?;
    let workflow = ReminderWorkflow::new(
        Arc::new(PgSubscriptionStore::new(db_pool.clone())),
        Arc::new(PgWorkflowRepository::new(db_pool)),
        Arc::new(sink),
        Arc::new(SystemClock),
        &config.reminders,
    );

    let worker = ReminderWorker::new(
        workflow,
        config.reminders.lease(),
        config.reminders.poll_interval(),
    );
    worker.run().await
}

pub struct ReminderWorker {
    workflow: ReminderWorkflow,
    lease: time::Duration,
    poll_interval: Duration,
}

impl ReminderWorker {
    pub fn new(workflow: ReminderWorkflow, lease: time::Duration, poll_interval: Duration) -> Self {
        Self {
            workflow,
            lease,
            poll_interval,
        }
    }

    pub async fn run(&self) -> Result<(), anyhow::Error> {
        loop {
            match self.try_execute_task().await {
                Ok(ExecutionOutcome::TaskCompleted) => {}
                Ok(ExecutionOutcome::EmptyQueue) => tokio::time::sleep(self.poll_interval).await,
                Err(_) => tokio::time::sleep(Duration::from_secs(1)).await,
            }
        }
    }

    /// Claims one due workflow run, drives it to its next suspension point or
    /// to the end, and hands it back. On failure the lease is left to expire so
    /// the run is retried from its last checkpoint.
    #[tracing::instrument(
        skip_all,
        fields(
            workflow_run_id=tracing::field::Empty,
            subscription_id=tracing::field::Empty),
        err
    )]
    pub async fn try_execute_task(&self) -> Result<ExecutionOutcome, anyhow::Error> {
        let runs = self.workflow.runs();
        let now = self.workflow.clock().now();

        let Some(mut run) = runs.claim_due(now, self.lease).await? else {
            return Ok(ExecutionOutcome::EmptyQueue);
        };

        Span::current()
            .record("workflow_run_id", run.id.to_string())
            .record("subscription_id", run.subscription_id.to_string());

        let outcome = self.workflow.execute(&mut run).await?;
        runs.release(&run).await?;

        if let WorkflowOutcome::Suspended { resume_at } = outcome {
            tracing::info!(%resume_at, "Workflow run parked");
        }

        Ok(ExecutionOutcome::TaskCompleted)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionOutcome {
    TaskCompleted,
    EmptyQueue,
}
