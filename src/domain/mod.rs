mod frequency;
mod reminder_plan;
mod renewal_policy;
mod subscription;
mod subscription_status;

pub use frequency::Frequency;
pub use reminder_plan::{
    build_plan, reminder_label, ReminderEntry, ReminderOffsets, ReminderPlan,
    DEFAULT_OFFSETS_DAYS,
};
pub use renewal_policy::{compute_renewal_date, derive_status, RenewalError};
pub use subscription::{NewSubscription, Subscription, SubscriptionError};
pub use subscription_status::SubscriptionStatus;
