use crate::helpers::TestApp;
use renewal_reminders::{domain::SubscriptionStatus, reminder_worker::ExecutionOutcome};
use serde_json::json;
use time::macros::{date, datetime};
use wiremock::{
    matchers::{body_json, header_exists, method, path},
    Mock, ResponseTemplate,
};

#[tokio::test]
async fn worker_reports_an_empty_queue_when_nothing_is_due() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;

    // when
    let outcome = app.try_execute_task().await;

    // then
    assert_eq!(outcome, ExecutionOutcome::EmptyQueue);
}

#[tokio::test]
async fn renewal_tomorrow_sends_the_last_reminder_only() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-30 09:00 UTC)).await;
    let subscription_id = app.insert_subscription(date!(2024 - 01 - 31), SubscriptionStatus::Active);

    Mock::given(path("/reminders"))
        .and(method("POST"))
        .and(header_exists("X-Notification-Token"))
        .and(body_json(json!({
            "subscriptionId": subscription_id,
            "label": "Reminder 1 days before",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.notification_server)
        .await;

    let run_id = app.trigger_reminder_workflow(subscription_id).await;

    // when
    app.dispatch_all_due_runs().await;

    // then
    let body = app.get_workflow_run_json(run_id).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["renewalDate"], "2024-01-31");
}

#[tokio::test]
async fn run_waits_until_the_first_reminder_day() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;
    let subscription_id = app.insert_subscription(date!(2024 - 01 - 31), SubscriptionStatus::Active);

    Mock::given(path("/reminders"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .named("No reminder before the first window")
        .mount(&app.notification_server)
        .await;

    let run_id = app.trigger_reminder_workflow(subscription_id).await;

    // when
    app.dispatch_all_due_runs().await;

    // then
    let body = app.get_workflow_run_json(run_id).await;
    assert_eq!(body["status"], "waiting");
    assert_eq!(body["resumeAt"], "2024-01-24T00:00:00Z");
    assert_eq!(body["nextStep"], 0);
}

#[tokio::test]
async fn suspended_run_resumes_on_its_day() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;
    let subscription_id = app.insert_subscription(date!(2024 - 01 - 31), SubscriptionStatus::Active);
    let run_id = app.trigger_reminder_workflow(subscription_id).await;
    app.dispatch_all_due_runs().await;

    Mock::given(path("/reminders"))
        .and(method("POST"))
        .and(body_json(json!({
            "subscriptionId": subscription_id,
            "label": "Reminder 7 days before",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.notification_server)
        .await;

    // when
    app.clock.set(datetime!(2024-01-24 08:00 UTC));
    app.dispatch_all_due_runs().await;

    // then
    let body = app.get_workflow_run_json(run_id).await;
    assert_eq!(body["status"], "waiting");
    assert_eq!(body["resumeAt"], "2024-01-26T00:00:00Z");
    assert_eq!(body["nextStep"], 1);
}

#[tokio::test]
async fn cancelled_subscription_aborts_without_reminders() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-30 09:00 UTC)).await;
    let subscription_id =
        app.insert_subscription(date!(2024 - 01 - 31), SubscriptionStatus::Cancelled);

    Mock::given(path("/reminders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.notification_server)
        .await;

    let run_id = app.trigger_reminder_workflow(subscription_id).await;

    // when
    app.dispatch_all_due_runs().await;

    // then
    let body = app.get_workflow_run_json(run_id).await;
    assert_eq!(body["status"], "aborted");
    assert_eq!(body["abortReason"], "subscription_cancelled");
}

#[tokio::test]
async fn subscription_cancelled_while_waiting_aborts_before_delivery() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;
    let subscription_id = app.insert_subscription(date!(2024 - 01 - 31), SubscriptionStatus::Active);
    let run_id = app.trigger_reminder_workflow(subscription_id).await;
    app.dispatch_all_due_runs().await;

    Mock::given(path("/reminders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.notification_server)
        .await;

    // when
    app.subscriptions.update(subscription_id, |subscription| {
        subscription.explicit_status = SubscriptionStatus::Cancelled;
    });
    app.clock.set(datetime!(2024-01-24 08:00 UTC));
    app.dispatch_all_due_runs().await;

    // then
    let body = app.get_workflow_run_json(run_id).await;
    assert_eq!(body["status"], "aborted");
    assert_eq!(body["abortReason"], "subscription_cancelled");
}

#[tokio::test]
async fn unknown_subscription_aborts_the_run() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;
    let run_id = app.trigger_reminder_workflow(uuid::Uuid::new_v4()).await;

    // when
    app.dispatch_all_due_runs().await;

    // then
    let body = app.get_workflow_run_json(run_id).await;
    assert_eq!(body["status"], "aborted");
    assert_eq!(body["abortReason"], "subscription_not_found");
}

#[tokio::test]
async fn rejected_delivery_does_not_stall_the_plan() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-30 09:00 UTC)).await;
    let subscription_id = app.insert_subscription(date!(2024 - 01 - 31), SubscriptionStatus::Active);

    Mock::given(path("/reminders"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.notification_server)
        .await;

    let run_id = app.trigger_reminder_workflow(subscription_id).await;

    // when
    app.dispatch_all_due_runs().await;

    // then
    let body = app.get_workflow_run_json(run_id).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["nextStep"], 4);
}
