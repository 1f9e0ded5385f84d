use axum::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Failed to reach the notification service")]
    Transport(#[from] reqwest::Error),
    #[error("Notification was rejected: {0}")]
    Rejected(String),
}

/// Receives the reminders the scheduler decides are due. How they reach the
/// subscriber is up to the implementation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, subscription_id: Uuid, label: &str) -> Result<(), DeliveryError>;
}

/// Posts reminders as JSON to an external notification service.
#[derive(Clone)]
pub struct HttpNotificationSink {
    http_client: Client,
    base_url: String,
    authorization_token: Secret<String>,
}

impl HttpNotificationSink {
    pub fn new(
        base_url: String,
        authorization_token: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url,
            authorization_token,
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn deliver(&self, subscription_id: Uuid, label: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/reminders", &self.base_url);
        let request_body = DeliverReminderRequest {
            subscription_id,
            label,
        };

        self.http_client
            .post(&url)
            .header(
                "X-Notification-Token",
                self.authorization_token.expose_secret(),
            )
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliverReminderRequest<'a> {
    subscription_id: Uuid,
    label: &'a str,
}
