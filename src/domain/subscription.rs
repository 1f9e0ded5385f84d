use super::{compute_renewal_date, derive_status, Frequency, RenewalError, SubscriptionStatus};
use time::Date;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub frequency: Frequency,
    pub start_date: Date,
    pub renewal_date: Date,
    /// Status as last written. Read the effective one through [`Subscription::status`].
    pub explicit_status: SubscriptionStatus,
}

impl Subscription {
    pub fn status(&self, today: Date) -> SubscriptionStatus {
        derive_status(self.renewal_date, today, self.explicit_status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Start date {0} is in the future")]
    StartDateInFuture(Date),
    #[error("Renewal date {renewal_date} must be after start date {start_date}")]
    RenewalNotAfterStart { start_date: Date, renewal_date: Date },
    #[error(transparent)]
    Renewal(#[from] RenewalError),
}

pub struct NewSubscription {
    pub user_id: Uuid,
    pub name: String,
    pub frequency: Frequency,
    pub start_date: Date,
    pub renewal_date: Option<Date>,
}

impl NewSubscription {
    pub fn into_subscription(self, id: Uuid, today: Date) -> Result<Subscription, SubscriptionError> {
        if self.start_date > today {
            return Err(SubscriptionError::StartDateInFuture(self.start_date));
        }

        let renewal_date = match self.renewal_date {
            Some(date) => date,
            None => compute_renewal_date(self.start_date, self.frequency)?,
        };

        if renewal_date <= self.start_date {
            return Err(SubscriptionError::RenewalNotAfterStart {
                start_date: self.start_date,
                renewal_date,
            });
        }

        Ok(Subscription {
            id,
            user_id: self.user_id,
            name: self.name,
            frequency: self.frequency,
            start_date: self.start_date,
            renewal_date,
            explicit_status: derive_status(renewal_date, today, SubscriptionStatus::Active),
        })
    }
}
