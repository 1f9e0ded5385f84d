use crate::helpers::TestDatabase;
use claims::{assert_err, assert_none, assert_ok, assert_some};
use renewal_reminders::{
    reminder_worker::ExecutionOutcome,
    workflow::{
        start_reminder_workflow, AbortReason, PlanSnapshot, RunStatus, StepKey,
        WorkflowRepository, WorkflowRun,
    },
};
use serde_json::json;
use time::{
    macros::{date, datetime},
    Duration,
};
use uuid::Uuid;
use wiremock::{
    matchers::{body_json, method, path},
    Mock, ResponseTemplate,
};

#[tokio::test]
async fn runs_are_not_claimed_before_they_are_due() {
    // given
    let db = TestDatabase::spawn(datetime!(2024-01-10 09:00 UTC)).await;
    let mut run = WorkflowRun::new(Uuid::new_v4(), datetime!(2024-01-10 09:00 UTC));
    run.resume_at = datetime!(2024-01-24 0:00 UTC);
    assert_ok!(db.workflows.create(&run).await);

    // when
    let early = db
        .workflows
        .claim_due(datetime!(2024-01-23 23:59:59 UTC), Duration::minutes(5))
        .await
        .unwrap();
    let on_time = db
        .workflows
        .claim_due(datetime!(2024-01-24 0:00 UTC), Duration::minutes(5))
        .await
        .unwrap();

    // then
    assert_none!(early);
    assert_eq!(assert_some!(on_time).id, run.id);
}

#[tokio::test]
async fn concurrent_claims_hand_a_run_to_one_worker() {
    // given
    let now = datetime!(2024-01-10 09:00 UTC);
    let db = TestDatabase::spawn(now).await;
    db.workflows
        .create(&WorkflowRun::new(Uuid::new_v4(), now))
        .await
        .unwrap();

    // when
    let (first, second) = tokio::join!(
        db.workflows.claim_due(now, Duration::minutes(5)),
        db.workflows.claim_due(now, Duration::minutes(5)),
    );

    // then
    let claimed = [first.unwrap(), second.unwrap()]
        .into_iter()
        .flatten()
        .count();
    assert_eq!(claimed, 1);
}

#[tokio::test]
async fn release_stores_progress_and_drops_the_lease() {
    // given
    let now = datetime!(2024-01-10 09:00 UTC);
    let db = TestDatabase::spawn(now).await;
    db.workflows
        .create(&WorkflowRun::new(Uuid::new_v4(), now))
        .await
        .unwrap();
    let mut run = db
        .workflows
        .claim_due(now, Duration::minutes(5))
        .await
        .unwrap()
        .unwrap();

    // when
    run.status = RunStatus::Waiting;
    run.snapshot = Some(PlanSnapshot {
        start_date: date!(2024 - 01 - 01),
        renewal_date: date!(2024 - 01 - 31),
    });
    run.next_step = 2;
    assert_ok!(db.workflows.checkpoint(&run).await);
    let while_checkpointed = db
        .workflows
        .claim_due(now, Duration::minutes(5))
        .await
        .unwrap();
    assert_ok!(db.workflows.release(&run).await);
    let stored = db.workflows.get(run.id).await.unwrap().unwrap();
    let after_release = db
        .workflows
        .claim_due(now, Duration::minutes(5))
        .await
        .unwrap();

    // then
    assert_none!(while_checkpointed);
    assert_none!(stored.lease);
    assert_eq!(stored.status, RunStatus::Waiting);
    assert_eq!(stored.snapshot, run.snapshot);
    assert_eq!(stored.next_step, 2);
    assert_eq!(assert_some!(after_release).id, run.id);
}

#[tokio::test]
async fn a_worker_that_lost_its_lease_cannot_roll_the_run_back() {
    // given
    let now = datetime!(2024-01-10 09:00 UTC);
    let db = TestDatabase::spawn(now).await;
    db.workflows
        .create(&WorkflowRun::new(Uuid::new_v4(), now))
        .await
        .unwrap();
    let mut stale = db
        .workflows
        .claim_due(now, Duration::minutes(5))
        .await
        .unwrap()
        .unwrap();
    let mut current = db
        .workflows
        .claim_due(now + Duration::minutes(6), Duration::minutes(5))
        .await
        .unwrap()
        .unwrap();
    current.status = RunStatus::Aborted(AbortReason::SubscriptionCancelled);
    db.workflows.release(&current).await.unwrap();

    // when
    stale.status = RunStatus::Waiting;
    stale.next_step = 1;
    let release = db.workflows.release(&stale).await;

    // then
    assert_err!(release);
    let stored = db.workflows.get(current.id).await.unwrap().unwrap();
    assert_eq!(
        stored.status,
        RunStatus::Aborted(AbortReason::SubscriptionCancelled)
    );
    assert_eq!(stored.next_step, 0);
}

#[tokio::test]
async fn a_step_is_recorded_once_per_position() {
    // given
    let now = datetime!(2024-01-10 09:00 UTC);
    let db = TestDatabase::spawn(now).await;
    let run = WorkflowRun::new(Uuid::new_v4(), now);
    db.workflows.create(&run).await.unwrap();
    let key = StepKey {
        subscription_id: run.subscription_id,
        renewal_date: date!(2024 - 01 - 31),
        position: 0,
    };
    let next_position = StepKey { position: 1, ..key };

    // when
    let first = db
        .workflows
        .claim_step(run.id, &key, "Reminder 7 days before")
        .await
        .unwrap();
    let again = db
        .workflows
        .claim_step(run.id, &key, "Reminder 7 days before")
        .await
        .unwrap();
    let relabelled = db
        .workflows
        .claim_step(run.id, &key, "Reminder 10 days before")
        .await
        .unwrap();
    let next = db
        .workflows
        .claim_step(run.id, &next_position, "Reminder 5 days before")
        .await
        .unwrap();

    // then
    assert!(first);
    assert!(!again);
    assert!(!relabelled);
    assert!(next);
}

#[tokio::test]
async fn malformed_subscription_row_aborts_the_run() {
    // given
    let now = datetime!(2024-01-10 09:00 UTC);
    let db = TestDatabase::spawn(now).await;
    let subscription_id = db
        .insert_subscription_row("hourly", date!(2024 - 01 - 01), None, "active")
        .await;
    let run_id = start_reminder_workflow(db.workflows.as_ref(), subscription_id, now)
        .await
        .unwrap();

    // when
    let outcome = db.try_execute_task().await;

    // then
    assert_eq!(outcome, ExecutionOutcome::TaskCompleted);
    let run = db.workflows.get(run_id).await.unwrap().unwrap();
    assert_eq!(
        run.status,
        RunStatus::Aborted(AbortReason::MalformedSubscription)
    );
    assert_eq!(db.try_execute_task().await, ExecutionOutcome::EmptyQueue);
}

#[tokio::test]
async fn due_reminder_is_delivered_and_recorded_in_the_ledger() {
    // given
    let now = datetime!(2024-01-30 09:00 UTC);
    let db = TestDatabase::spawn(now).await;
    let subscription_id = db
        .insert_subscription_row(
            "monthly",
            date!(2024 - 01 - 01),
            Some(date!(2024 - 01 - 31)),
            "active",
        )
        .await;

    Mock::given(path("/reminders"))
        .and(method("POST"))
        .and(body_json(json!({
            "subscriptionId": subscription_id,
            "label": "Reminder 1 days before",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&db.notification_server)
        .await;

    let run_id = start_reminder_workflow(db.workflows.as_ref(), subscription_id, now)
        .await
        .unwrap();

    // when
    db.try_execute_task().await;

    // then
    let run = db.workflows.get(run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.next_step, 4);

    let (steps, label): (i64, String) = sqlx::query_as(
        "SELECT COUNT(*) OVER (), label FROM reminder_steps WHERE subscription_id = $1",
    )
    .bind(subscription_id)
    .fetch_one(&db.db_pool)
    .await
    .unwrap();
    assert_eq!(steps, 1);
    assert_eq!(label, "Reminder 1 days before");
}

#[tokio::test]
async fn suspended_run_is_picked_up_again_on_its_day() {
    // given
    let now = datetime!(2024-01-10 09:00 UTC);
    let db = TestDatabase::spawn(now).await;
    let subscription_id = db
        .insert_subscription_row(
            "monthly",
            date!(2024 - 01 - 01),
            Some(date!(2024 - 01 - 31)),
            "active",
        )
        .await;
    let run_id = start_reminder_workflow(db.workflows.as_ref(), subscription_id, now)
        .await
        .unwrap();
    db.try_execute_task().await;

    Mock::given(path("/reminders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&db.notification_server)
        .await;

    // when
    let before_due = db.try_execute_task().await;
    db.clock.set(datetime!(2024-01-24 08:00 UTC));
    let on_due = db.try_execute_task().await;

    // then
    assert_eq!(before_due, ExecutionOutcome::EmptyQueue);
    assert_eq!(on_due, ExecutionOutcome::TaskCompleted);
    let run = db.workflows.get(run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Waiting);
    assert_eq!(run.next_step, 1);
    assert_eq!(run.resume_at, datetime!(2024-01-26 0:00 UTC));
    assert_none!(run.lease);
}
