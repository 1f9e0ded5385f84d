use crate::{
    app_state::AppState,
    workflow::{start_reminder_workflow, AbortReason, PlanSnapshot, WorkflowRun},
};
use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/workflows/subscription/reminder",
            post(trigger_reminder_workflow),
        )
        .route("/api/v1/workflows/:workflow_run_id", get(workflow_run))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerPayload {
    subscription_id: Uuid,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerResponse {
    workflow_run_id: Uuid,
}

#[tracing::instrument(
    name = "Trigger a reminder workflow",
    skip(app_state, payload),
    fields(subscription_id = tracing::field::Empty)
)]
async fn trigger_reminder_workflow(
    State(app_state): State<AppState>,
    Json(payload): Json<TriggerPayload>,
) -> Result<(StatusCode, Json<TriggerResponse>), WorkflowRouteError> {
    tracing::Span::current().record(
        "subscription_id",
        &tracing::field::display(&payload.subscription_id),
    );

    let workflow_run_id = start_reminder_workflow(
        app_state.workflows.as_ref(),
        payload.subscription_id,
        app_state.clock.now(),
    )
    .await
    .context("Failed to schedule the reminder workflow")?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse { workflow_run_id }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowRunView {
    workflow_run_id: Uuid,
    subscription_id: Uuid,
    status: &'static str,
    abort_reason: Option<AbortReason>,
    renewal_date: Option<Date>,
    next_step: usize,
    #[serde(with = "time::serde::rfc3339")]
    resume_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl From<WorkflowRun> for WorkflowRunView {
    fn from(run: WorkflowRun) -> Self {
        Self {
            workflow_run_id: run.id,
            subscription_id: run.subscription_id,
            status: run.status.as_str(),
            abort_reason: run.status.abort_reason(),
            renewal_date: run.snapshot.map(|PlanSnapshot { renewal_date, .. }| renewal_date),
            next_step: run.next_step,
            resume_at: run.resume_at,
            created_at: run.created_at,
        }
    }
}

#[tracing::instrument(name = "Inspect a reminder workflow", skip(app_state))]
async fn workflow_run(
    State(app_state): State<AppState>,
    Path(workflow_run_id): Path<Uuid>,
) -> Result<Json<WorkflowRunView>, WorkflowRouteError> {
    let run = app_state
        .workflows
        .get(workflow_run_id)
        .await
        .context("Failed to fetch the workflow run")?
        .ok_or(WorkflowRouteError::UnknownWorkflowRun(workflow_run_id))?;

    Ok(Json(run.into()))
}

#[derive(Debug, thiserror::Error)]
enum WorkflowRouteError {
    #[error("Workflow run `{0}` does not exist")]
    UnknownWorkflowRun(Uuid),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl IntoResponse for WorkflowRouteError {
    fn into_response(self) -> Response {
        match self {
            Self::UnknownWorkflowRun(_) => {
                tracing::info!("{}", self);
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            Self::UnexpectedError(_) => {
                tracing::error!("{:#?}", self);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
