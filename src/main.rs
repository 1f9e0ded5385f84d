use renewal_reminders::{
    configuration::get_configuration,
    reminder_worker::run_worker_until_stopped,
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
};
use std::fmt::{Debug, Display};
use tokio::task::JoinError;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let subscriber = get_subscriber("renewal_reminders".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber)?;

    let config = get_configuration()?;
    let application = Application::build(config.clone()).await?;

    let application_task = tokio::spawn(application.run_until_stopped());
    let worker_task = tokio::spawn(run_worker_until_stopped(config));

    tokio::select! {
        outcome = application_task => report_exit("API", outcome),
        outcome = worker_task => report_exit("Reminder workflow worker", outcome),
    };

    Ok(())
}

fn report_exit(task_name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => tracing::info!("{task_name} has exited"),
        Ok(Err(e)) => tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "{task_name} failed"
        ),
        Err(e) => tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "{task_name} task failed to complete"
        ),
    }
}
