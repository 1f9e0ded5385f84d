use crate::{domain::ReminderOffsets, notification_sink::HttpNotificationSink};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::{
    postgres::{PgConnectOptions, PgSslMode},
    ConnectOptions,
};
use std::time::Duration;
use tracing_log::log::LevelFilter;

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub notification_sink: NotificationSinkSettings,
    pub reminders: ReminderSettings,
}

#[derive(Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    pub database_name: String,
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn with_db(&self) -> PgConnectOptions {
        self.without_db()
            .database(&self.database_name)
            .log_statements(LevelFilter::Trace)
    }

    pub fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose_secret())
            .ssl_mode(ssl_mode)
    }
}

#[derive(Clone, Deserialize)]
pub struct NotificationSinkSettings {
    pub base_url: String,
    pub authorization_token: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl NotificationSinkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    pub fn client(&self) -> Result<HttpNotificationSink, reqwest::Error> {
        HttpNotificationSink::new(
            self.base_url.clone(),
            self.authorization_token.clone(),
            self.timeout(),
        )
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReminderSettings {
    pub offsets_days: Vec<u32>,
    pub recheck_before_delivery: bool,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval_seconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub lease_seconds: u64,
}

impl ReminderSettings {
    pub fn offsets(&self) -> ReminderOffsets {
        ReminderOffsets::new(self.offsets_days.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn lease(&self) -> time::Duration {
        time::Duration::seconds(self.lease_seconds.try_into().unwrap_or(i64::MAX))
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let config_dir = std::env::current_dir()
        .map(|dir| dir.join("configuration"))
        .map_err(|e| {
            config::ConfigError::Message(format!("Failed to determine the current directory: {e}"))
        })?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let env_config = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(config_dir.join("base.yaml")))
        .add_source(config::File::from(config_dir.join(env_config)))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}

#[derive(Debug)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "`{other}` is not a supported environment. Use either `local` or `production`."
            )),
        }
    }
}
