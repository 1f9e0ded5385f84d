use super::{StepKey, WorkflowRun};
use axum::async_trait;
use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Mutex, PoisonError},
};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Durable home of workflow continuations and of the delivery step ledger.
///
/// A run is handed to at most one worker at a time. `claim_due` leases it
/// until `now + lease` under a fresh token, `checkpoint` records progress
/// while the lease is held and `release` stores the final state of the
/// execution and drops the lease. Both writes fail when the token on the run
/// no longer matches the stored one. A crashed worker's lease simply runs out
/// and the run is claimed again from its last checkpoint.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create(&self, run: &WorkflowRun) -> Result<(), anyhow::Error>;

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRun>, anyhow::Error>;

    /// Leases the most overdue live run whose `resume_at` is not after `now`.
    async fn claim_due(
        &self,
        now: OffsetDateTime,
        lease: Duration,
    ) -> Result<Option<WorkflowRun>, anyhow::Error>;

    async fn checkpoint(&self, run: &WorkflowRun) -> Result<(), anyhow::Error>;

    async fn release(&self, run: &WorkflowRun) -> Result<(), anyhow::Error>;

    /// Durably marks a delivery step as taken. Returns `false` when the step
    /// had already been claimed, in which case its side effect must not run.
    async fn claim_step(
        &self,
        run_id: Uuid,
        key: &StepKey,
        label: &str,
    ) -> Result<bool, anyhow::Error>;
}

#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    runs: Mutex<HashMap<Uuid, StoredRun>>,
    steps: Mutex<HashMap<StepKey, String>>,
}

#[derive(Debug)]
struct StoredRun {
    run: WorkflowRun,
    locked_until: Option<OffsetDateTime>,
}

impl InMemoryWorkflowRepository {
    fn write(&self, run: &WorkflowRun, keep_lease: bool) -> Result<(), anyhow::Error> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        let stored = runs
            .get_mut(&run.id)
            .ok_or_else(|| anyhow::anyhow!("Workflow run `{}` does not exist", run.id))?;
        if stored.run.lease != run.lease {
            anyhow::bail!("Workflow run `{}` is leased by another worker", run.id);
        }
        stored.run = run.clone();
        if !keep_lease {
            stored.run.lease = None;
            stored.locked_until = None;
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create(&self, run: &WorkflowRun) -> Result<(), anyhow::Error> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if runs.contains_key(&run.id) {
            anyhow::bail!("Workflow run `{}` already exists", run.id);
        }
        runs.insert(
            run.id,
            StoredRun {
                run: run.clone(),
                locked_until: None,
            },
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRun>, anyhow::Error> {
        Ok(self
            .runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|stored| stored.run.clone()))
    }

    async fn claim_due(
        &self,
        now: OffsetDateTime,
        lease: Duration,
    ) -> Result<Option<WorkflowRun>, anyhow::Error> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        let due = runs
            .values_mut()
            .filter(|stored| {
                !stored.run.status.is_terminal()
                    && stored.run.resume_at <= now
                    && stored.locked_until.map_or(true, |until| until < now)
            })
            .min_by_key(|stored| stored.run.resume_at);

        Ok(due.map(|stored| {
            stored.locked_until = Some(now + lease);
            stored.run.lease = Some(Uuid::new_v4());
            stored.run.clone()
        }))
    }

    async fn checkpoint(&self, run: &WorkflowRun) -> Result<(), anyhow::Error> {
        self.write(run, true)
    }

    async fn release(&self, run: &WorkflowRun) -> Result<(), anyhow::Error> {
        self.write(run, false)
    }

    async fn claim_step(
        &self,
        _run_id: Uuid,
        key: &StepKey,
        label: &str,
    ) -> Result<bool, anyhow::Error> {
        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        match steps.entry(*key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(label.to_owned());
                Ok(true)
            }
        }
    }
}
