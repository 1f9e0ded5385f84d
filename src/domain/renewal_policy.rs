use super::{Frequency, SubscriptionStatus};
use time::{Date, Duration};

#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    #[error("`{0}` is not a supported billing frequency")]
    InvalidFrequency(String),
    #[error("Renewal date falls outside the supported calendar range")]
    DateOutOfRange,
}

pub fn compute_renewal_date(start_date: Date, frequency: Frequency) -> Result<Date, RenewalError> {
    start_date
        .checked_add(Duration::days(frequency.period_days()))
        .ok_or(RenewalError::DateOutOfRange)
}

/// Effective status as observed on `today`. Cancellation always wins;
/// otherwise a renewal date in the past means the subscription has expired.
pub fn derive_status(
    renewal_date: Date,
    today: Date,
    explicit: SubscriptionStatus,
) -> SubscriptionStatus {
    match explicit {
        SubscriptionStatus::Cancelled => SubscriptionStatus::Cancelled,
        _ if renewal_date < today => SubscriptionStatus::Expired,
        _ => SubscriptionStatus::Active,
    }
}
