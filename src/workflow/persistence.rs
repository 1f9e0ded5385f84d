use super::{PlanSnapshot, RunStatus, StepKey, WorkflowRepository, WorkflowRun};
use anyhow::Context;
use axum::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

const RUN_COLUMNS: &str = r#"
    workflow_run_id,
    subscription_id,
    status,
    abort_reason,
    snapshot_start_date,
    snapshot_renewal_date,
    next_step,
    resume_at,
    created_at,
    lease_token
"#;

#[derive(Clone)]
pub struct PgWorkflowRepository {
    db_pool: PgPool,
}

impl PgWorkflowRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn write(&self, run: &WorkflowRun, keep_lease: bool) -> Result<(), anyhow::Error> {
        let next_step = i32::try_from(run.next_step).context("Step index out of range")?;
        let result = sqlx::query(
            r#"
            UPDATE reminder_workflows
            SET
                status = $2,
                abort_reason = $3,
                snapshot_start_date = $4,
                snapshot_renewal_date = $5,
                next_step = $6,
                resume_at = $7,
                locked_until = CASE WHEN $8 THEN locked_until ELSE NULL END,
                lease_token = CASE WHEN $8 THEN lease_token ELSE NULL END,
                updated_at = now()
            WHERE
                workflow_run_id = $1 AND
                lease_token IS NOT DISTINCT FROM $9
            "#,
        )
        .bind(run.id)
        .bind(run.status.as_str())
        .bind(run.status.abort_reason().map(|r| r.as_ref().to_owned()))
        .bind(run.snapshot.map(|s| s.start_date))
        .bind(run.snapshot.map(|s| s.renewal_date))
        .bind(next_step)
        .bind(run.resume_at)
        .bind(keep_lease)
        .bind(run.lease)
        .execute(&self.db_pool)
        .await
        .context("Failed to update workflow run")?;

        if result.rows_affected() == 0 {
            anyhow::bail!(
                "Workflow run `{}` does not exist or is leased by another worker",
                run.id
            );
        }

        Ok(())
    }
}

fn run_from_row(row: PgRow) -> Result<WorkflowRun, anyhow::Error> {
    let status: String = row.try_get("status")?;
    let abort_reason: Option<String> = row.try_get("abort_reason")?;
    let status = RunStatus::from_parts(&status, abort_reason).map_err(anyhow::Error::msg)?;

    let start_date: Option<Date> = row.try_get("snapshot_start_date")?;
    let renewal_date: Option<Date> = row.try_get("snapshot_renewal_date")?;
    let snapshot = match (start_date, renewal_date) {
        (Some(start_date), Some(renewal_date)) => Some(PlanSnapshot {
            start_date,
            renewal_date,
        }),
        _ => None,
    };

    let next_step: i32 = row.try_get("next_step")?;

    Ok(WorkflowRun {
        id: row.try_get("workflow_run_id")?,
        subscription_id: row.try_get("subscription_id")?,
        status,
        snapshot,
        next_step: usize::try_from(next_step).context("Negative step index")?,
        resume_at: row.try_get("resume_at")?,
        created_at: row.try_get("created_at")?,
        lease: row.try_get("lease_token")?,
    })
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    #[tracing::instrument(skip_all, fields(workflow_run_id = %run.id))]
    async fn create(&self, run: &WorkflowRun) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO reminder_workflows (
                workflow_run_id,
                subscription_id,
                status,
                next_step,
                resume_at,
                created_at,
                updated_at
            )
            VALUES ($1, $2, $3, 0, $4, $5, now())
            "#,
        )
        .bind(run.id)
        .bind(run.subscription_id)
        .bind(run.status.as_str())
        .bind(run.resume_at)
        .bind(run.created_at)
        .execute(&self.db_pool)
        .await
        .context("Failed to insert workflow run")?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<WorkflowRun>, anyhow::Error> {
        sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM reminder_workflows WHERE workflow_run_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to fetch workflow run")?
        .map(run_from_row)
        .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn claim_due(
        &self,
        now: OffsetDateTime,
        lease: Duration,
    ) -> Result<Option<WorkflowRun>, anyhow::Error> {
        sqlx::query(&format!(
            r#"
            UPDATE reminder_workflows
            SET
                locked_until = $2,
                lease_token = $3
            WHERE workflow_run_id = (
                SELECT workflow_run_id
                FROM reminder_workflows
                WHERE
                    status IN ('pending', 'waiting') AND
                    resume_at <= $1 AND
                    (locked_until IS NULL OR locked_until < $1)
                ORDER BY resume_at
                FOR UPDATE
                SKIP LOCKED
                LIMIT 1
            )
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(now + lease)
        .bind(Uuid::new_v4())
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to claim a due workflow run")?
        .map(run_from_row)
        .transpose()
    }

    #[tracing::instrument(skip_all, fields(workflow_run_id = %run.id, next_step = run.next_step))]
    async fn checkpoint(&self, run: &WorkflowRun) -> Result<(), anyhow::Error> {
        self.write(run, true).await
    }

    #[tracing::instrument(skip_all, fields(workflow_run_id = %run.id, status = run.status.as_str()))]
    async fn release(&self, run: &WorkflowRun) -> Result<(), anyhow::Error> {
        self.write(run, false).await
    }

    #[tracing::instrument(skip(self, key), fields(position = key.position))]
    async fn claim_step(
        &self,
        run_id: Uuid,
        key: &StepKey,
        label: &str,
    ) -> Result<bool, anyhow::Error> {
        let position = i32::try_from(key.position).context("Step position out of range")?;
        let result = sqlx::query(
            r#"
            INSERT INTO reminder_steps (
                subscription_id,
                renewal_date,
                position,
                label,
                workflow_run_id,
                completed_at
            )
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(key.subscription_id)
        .bind(key.renewal_date)
        .bind(position)
        .bind(label)
        .bind(run_id)
        .execute(&self.db_pool)
        .await
        .context("Failed to record reminder step")?;

        Ok(result.rows_affected() == 1)
    }
}
