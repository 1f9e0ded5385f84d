pub mod app_state;
pub mod clock;
pub mod configuration;
pub mod domain;
pub mod notification_sink;
pub mod reminder_worker;
pub mod request_id;
pub mod routes;
pub mod startup;
pub mod subscription_store;
pub mod telemetry;
pub mod workflow;
