use crate::domain::{ReminderEntry, SubscriptionStatus};
use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    SubscriptionNotFound,
    MalformedSubscription,
    SubscriptionExpired,
    SubscriptionCancelled,
    RenewalDatePassed,
    RenewalDateChanged,
}

impl AbortReason {
    pub fn inactive(status: SubscriptionStatus) -> Option<AbortReason> {
        match status {
            SubscriptionStatus::Active => None,
            SubscriptionStatus::Expired => Some(AbortReason::SubscriptionExpired),
            SubscriptionStatus::Cancelled => Some(AbortReason::SubscriptionCancelled),
        }
    }
}

impl AsRef<str> for AbortReason {
    fn as_ref(&self) -> &'static str {
        match self {
            AbortReason::SubscriptionNotFound => "subscription_not_found",
            AbortReason::MalformedSubscription => "malformed_subscription",
            AbortReason::SubscriptionExpired => "subscription_expired",
            AbortReason::SubscriptionCancelled => "subscription_cancelled",
            AbortReason::RenewalDatePassed => "renewal_date_passed",
            AbortReason::RenewalDateChanged => "renewal_date_changed",
        }
    }
}

impl TryFrom<String> for AbortReason {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.as_ref() {
            "subscription_not_found" => Ok(AbortReason::SubscriptionNotFound),
            "malformed_subscription" => Ok(AbortReason::MalformedSubscription),
            "subscription_expired" => Ok(AbortReason::SubscriptionExpired),
            "subscription_cancelled" => Ok(AbortReason::SubscriptionCancelled),
            "renewal_date_passed" => Ok(AbortReason::RenewalDatePassed),
            "renewal_date_changed" => Ok(AbortReason::RenewalDateChanged),
            other => Err(format!("`{other}` is not a valid variant of AbortReason")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Triggered, subscription not loaded yet.
    Pending,
    /// Evaluated and parked until `resume_at`.
    Waiting,
    Completed,
    Aborted(AbortReason),
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Aborted(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Waiting => "waiting",
            RunStatus::Completed => "completed",
            RunStatus::Aborted(_) => "aborted",
        }
    }

    pub fn abort_reason(&self) -> Option<AbortReason> {
        match self {
            RunStatus::Aborted(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn from_parts(status: &str, abort_reason: Option<String>) -> Result<RunStatus, String> {
        match (status, abort_reason) {
            ("pending", None) => Ok(RunStatus::Pending),
            ("waiting", None) => Ok(RunStatus::Waiting),
            ("completed", None) => Ok(RunStatus::Completed),
            ("aborted", Some(reason)) => AbortReason::try_from(reason).map(RunStatus::Aborted),
            (status, reason) => Err(format!(
                "`{status}` with abort reason `{reason:?}` is not a valid RunStatus"
            )),
        }
    }
}

/// Subscription dates captured when the run was evaluated. The plan is
/// rebuilt from these on every resume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanSnapshot {
    pub start_date: Date,
    pub renewal_date: Date,
}

/// Persisted continuation of one reminder pass over one subscription.
#[derive(Clone, Debug)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub status: RunStatus,
    pub snapshot: Option<PlanSnapshot>,
    pub next_step: usize,
    pub resume_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    /// Token of the lease this copy was claimed under. Writes are refused once
    /// another worker holds the run.
    pub lease: Option<Uuid>,
}

impl WorkflowRun {
    pub fn new(subscription_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            status: RunStatus::Pending,
            snapshot: None,
            next_step: 0,
            resume_at: now,
            created_at: now,
            lease: None,
        }
    }
}

/// Identity of a delivery step. Scoped to a billing cycle by the renewal date.
/// The label is recorded next to the key but is not part of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StepKey {
    pub subscription_id: Uuid,
    pub renewal_date: Date,
    pub position: usize,
}

impl StepKey {
    pub fn new(subscription_id: Uuid, renewal_date: Date, entry: &ReminderEntry) -> Self {
        Self {
            subscription_id,
            renewal_date,
            position: entry.position,
        }
    }
}
