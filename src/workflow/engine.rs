use super::{AbortReason, PlanSnapshot, RunStatus, StepKey, WorkflowRepository, WorkflowRun};
use crate::{
    clock::Clock,
    configuration::ReminderSettings,
    domain::{build_plan, ReminderEntry, ReminderOffsets, Subscription},
    notification_sink::NotificationSink,
    subscription_store::{StoreError, SubscriptionStore},
};
use std::{cmp::Ordering, sync::Arc};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Registers a new reminder pass for a subscription. The run is picked up by
/// the worker; nothing is awaited beyond persisting it.
#[tracing::instrument(name = "Start reminder workflow", skip(runs))]
pub async fn start_reminder_workflow(
    runs: &dyn WorkflowRepository,
    subscription_id: Uuid,
    now: OffsetDateTime,
) -> Result<Uuid, anyhow::Error> {
    let run = WorkflowRun::new(subscription_id, now);
    runs.create(&run).await?;
    tracing::info!(workflow_run_id = %run.id, "Reminder workflow scheduled");
    Ok(run.id)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowOutcome {
    Suspended { resume_at: OffsetDateTime },
    Completed,
    Aborted(AbortReason),
}

enum WorkflowState {
    Loading,
    Evaluating(Subscription),
    Waiting(OffsetDateTime),
    Delivering(PlanSnapshot, ReminderEntry),
    Completed,
    Aborted(AbortReason),
}

#[derive(Clone)]
pub struct ReminderWorkflow {
    subscriptions: Arc<dyn SubscriptionStore>,
    runs: Arc<dyn WorkflowRepository>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    offsets: ReminderOffsets,
    recheck_before_delivery: bool,
}

impl ReminderWorkflow {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        runs: Arc<dyn WorkflowRepository>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: &ReminderSettings,
    ) -> Self {
        Self {
            subscriptions,
            runs,
            sink,
            clock,
            offsets: settings.offsets(),
            recheck_before_delivery: settings.recheck_before_delivery,
        }
    }

    pub fn runs(&self) -> &dyn WorkflowRepository {
        self.runs.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Drives `run` until it suspends or terminates. Progress is checkpointed
    /// at every step boundary; the caller persists the returned state.
    ///
    /// Errors are infrastructure failures. The run is left at its last
    /// checkpoint and can be executed again.
    #[tracing::instrument(
        name = "Execute reminder workflow",
        skip_all,
        fields(workflow_run_id = %run.id, subscription_id = %run.subscription_id)
    )]
    pub async fn execute(&self, run: &mut WorkflowRun) -> Result<WorkflowOutcome, anyhow::Error> {
        let mut state = match (run.status, run.snapshot) {
            (RunStatus::Completed, _) => return Ok(WorkflowOutcome::Completed),
            (RunStatus::Aborted(reason), _) => return Ok(WorkflowOutcome::Aborted(reason)),
            (RunStatus::Pending, _) => WorkflowState::Loading,
            (RunStatus::Waiting, Some(snapshot)) => self.schedule(run, snapshot),
            (RunStatus::Waiting, None) => {
                tracing::error!("Waiting workflow run has no subscription snapshot");
                WorkflowState::Aborted(AbortReason::MalformedSubscription)
            }
        };

        loop {
            state = match state {
                WorkflowState::Loading => self.load(run.subscription_id).await?,
                WorkflowState::Evaluating(subscription) => {
                    self.evaluate(run, subscription).await?
                }
                WorkflowState::Delivering(snapshot, entry) => {
                    self.deliver(run, snapshot, entry).await?
                }
                WorkflowState::Waiting(resume_at) => {
                    tracing::info!(%resume_at, next_step = run.next_step, "Suspending until next reminder");
                    run.status = RunStatus::Waiting;
                    run.resume_at = resume_at;
                    return Ok(WorkflowOutcome::Suspended { resume_at });
                }
                WorkflowState::Completed => {
                    tracing::info!("Reminder plan exhausted");
                    run.status = RunStatus::Completed;
                    return Ok(WorkflowOutcome::Completed);
                }
                WorkflowState::Aborted(reason) => {
                    tracing::info!(reason = reason.as_ref(), "Reminder workflow aborted");
                    run.status = RunStatus::Aborted(reason);
                    return Ok(WorkflowOutcome::Aborted(reason));
                }
            };
        }
    }

    async fn load(&self, subscription_id: Uuid) -> Result<WorkflowState, anyhow::Error> {
        match self.fetch(subscription_id).await? {
            Ok(subscription) => Ok(WorkflowState::Evaluating(subscription)),
            Err(reason) => Ok(WorkflowState::Aborted(reason)),
        }
    }

    /// Outer error: the store is unavailable. Inner error: the subscription
    /// cannot be reminded about.
    async fn fetch(
        &self,
        subscription_id: Uuid,
    ) -> Result<Result<Subscription, AbortReason>, anyhow::Error> {
        match self.subscriptions.get(subscription_id).await {
            Ok(Some(subscription)) => Ok(Ok(subscription)),
            Ok(None) => {
                tracing::info!("Subscription not found");
                Ok(Err(AbortReason::SubscriptionNotFound))
            }
            Err(StoreError::Malformed { id, reason }) => {
                tracing::error!(
                    subscription_id = %id,
                    error.message = %reason,
                    "Subscription data failed integrity checks"
                );
                Ok(Err(AbortReason::MalformedSubscription))
            }
            Err(StoreError::UnexpectedError(e)) => Err(e),
        }
    }

    async fn evaluate(
        &self,
        run: &mut WorkflowRun,
        subscription: Subscription,
    ) -> Result<WorkflowState, anyhow::Error> {
        let now = self.clock.now();

        if let Some(reason) = AbortReason::inactive(subscription.status(now.date())) {
            return Ok(WorkflowState::Aborted(reason));
        }

        if start_of_day(subscription.renewal_date) < now {
            tracing::info!(
                renewal_date = %subscription.renewal_date,
                "Renewal date has passed"
            );
            return Ok(WorkflowState::Aborted(AbortReason::RenewalDatePassed));
        }

        let snapshot = PlanSnapshot {
            start_date: subscription.start_date,
            renewal_date: subscription.renewal_date,
        };
        run.snapshot = Some(snapshot);
        run.status = RunStatus::Waiting;
        run.next_step = 0;
        run.resume_at = now;
        self.runs.checkpoint(run).await?;

        Ok(self.schedule(run, snapshot))
    }

    /// Picks the state for the plan entry at `run.next_step`, skipping entries
    /// whose day has already gone by.
    fn schedule(&self, run: &mut WorkflowRun, snapshot: PlanSnapshot) -> WorkflowState {
        let plan = build_plan(snapshot.renewal_date, snapshot.start_date, &self.offsets);
        let today = self.clock.today();

        while let Some(entry) = plan.get(run.next_step) {
            match entry.instant.cmp(&today) {
                Ordering::Greater => return WorkflowState::Waiting(start_of_day(entry.instant)),
                Ordering::Equal => return WorkflowState::Delivering(snapshot, entry.clone()),
                Ordering::Less => {
                    tracing::info!(
                        label = %entry.label,
                        instant = %entry.instant,
                        "Reminder window missed. Skipping."
                    );
                    run.next_step += 1;
                }
            }
        }

        WorkflowState::Completed
    }

    async fn deliver(
        &self,
        run: &mut WorkflowRun,
        snapshot: PlanSnapshot,
        entry: ReminderEntry,
    ) -> Result<WorkflowState, anyhow::Error> {
        if self.recheck_before_delivery {
            if let Some(reason) = self.recheck(run.subscription_id, snapshot).await? {
                return Ok(WorkflowState::Aborted(reason));
            }
        }

        let key = StepKey::new(run.subscription_id, snapshot.renewal_date, &entry);
        if self.runs.claim_step(run.id, &key, &entry.label).await? {
            match self.sink.deliver(run.subscription_id, &entry.label).await {
                Ok(()) => tracing::info!(label = %entry.label, "Reminder delivered"),
                Err(e) => tracing::error!(
                    error_cause_chain = ?e,
                    error.message = %e,
                    label = %entry.label,
                    "Failed to deliver reminder. Skipping."
                ),
            }
        } else {
            tracing::info!(label = %entry.label, "Reminder already delivered");
        }

        run.next_step = entry.position + 1;
        self.runs.checkpoint(run).await?;

        Ok(self.schedule(run, snapshot))
    }

    async fn recheck(
        &self,
        subscription_id: Uuid,
        snapshot: PlanSnapshot,
    ) -> Result<Option<AbortReason>, anyhow::Error> {
        let subscription = match self.fetch(subscription_id).await? {
            Ok(subscription) => subscription,
            Err(reason) => return Ok(Some(reason)),
        };

        if let Some(reason) = AbortReason::inactive(subscription.status(self.clock.today())) {
            return Ok(Some(reason));
        }

        if subscription.renewal_date != snapshot.renewal_date {
            tracing::info!(
                planned = %snapshot.renewal_date,
                current = %subscription.renewal_date,
                "Renewal date changed since the plan was built"
            );
            return Ok(Some(AbortReason::RenewalDateChanged));
        }

        Ok(None)
    }
}

fn start_of_day(date: Date) -> OffsetDateTime {
    date.midnight().assume_utc()
}
