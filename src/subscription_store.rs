use crate::domain::{compute_renewal_date, Frequency, Subscription, SubscriptionStatus};
use anyhow::Context;
use axum::async_trait;
use sqlx::{PgPool, Row};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use time::Date;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Subscription `{id}` is malformed: {reason}")]
    Malformed { id: Uuid, reason: String },
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, StoreError>;
}

#[derive(Clone)]
pub struct PgSubscriptionStore {
    db_pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    #[tracing::instrument(name = "Load subscription", skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, name, frequency, start_date, renewal_date, status
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to fetch subscription")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let record = SubscriptionRecord {
            id,
            user_id: row.try_get("user_id").context("Failed to read user_id")?,
            name: row.try_get("name").context("Failed to read name")?,
            frequency: row.try_get("frequency").context("Failed to read frequency")?,
            start_date: row.try_get("start_date").context("Failed to read start_date")?,
            renewal_date: row
                .try_get("renewal_date")
                .context("Failed to read renewal_date")?,
            status: row.try_get("status").context("Failed to read status")?,
        };

        record.try_into().map(Some)
    }
}

struct SubscriptionRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    frequency: String,
    start_date: Date,
    renewal_date: Option<Date>,
    status: String,
}

impl TryFrom<SubscriptionRecord> for Subscription {
    type Error = StoreError;

    fn try_from(record: SubscriptionRecord) -> Result<Self, Self::Error> {
        let id = record.id;
        let malformed = |reason: String| StoreError::Malformed { id, reason };

        let frequency = Frequency::parse(&record.frequency).map_err(|e| malformed(e.to_string()))?;
        let explicit_status =
            SubscriptionStatus::try_from(record.status).map_err(malformed)?;
        let renewal_date = match record.renewal_date {
            Some(date) => date,
            None => compute_renewal_date(record.start_date, frequency)
                .map_err(|e| malformed(e.to_string()))?,
        };

        if renewal_date <= record.start_date {
            return Err(malformed(format!(
                "renewal date {renewal_date} is not after start date {}",
                record.start_date
            )));
        }

        Ok(Subscription {
            id,
            user_id: record.user_id,
            name: record.name,
            frequency,
            start_date: record.start_date,
            renewal_date,
            explicit_status,
        })
    }
}

/// Process-local store, for tests and single-node wiring.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<HashMap<Uuid, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn insert(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscription.id, subscription);
    }

    pub fn remove(&self, id: Uuid) -> Option<Subscription> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn update<F>(&self, id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut Subscription),
    {
        match self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            Some(subscription) => {
                f(subscription);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}
