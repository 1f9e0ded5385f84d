use crate::helpers::TestApp;
use renewal_reminders::{
    domain::SubscriptionStatus,
    workflow::{RunStatus, WorkflowRepository},
};
use serde_json::json;
use time::macros::{date, datetime};
use uuid::Uuid;

#[tokio::test]
async fn trigger_returns_a_202_with_the_workflow_run_id() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;
    let subscription_id = app.insert_subscription(date!(2024 - 01 - 31), SubscriptionStatus::Active);

    // when
    let response = app
        .post_reminder_workflow(&json!({ "subscriptionId": subscription_id }))
        .await;

    // then
    assert_eq!(response.status().as_u16(), 202);
    let body: serde_json::Value = response.json().await.unwrap();
    let run_id = Uuid::parse_str(body["workflowRunId"].as_str().unwrap()).unwrap();
    let run = app.workflows.get(run_id).await.unwrap().unwrap();
    assert_eq!(run.subscription_id, subscription_id);
    assert_eq!(run.status, RunStatus::Pending);
}

#[tokio::test]
async fn trigger_does_not_check_that_the_subscription_exists() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;

    // when
    let response = app
        .post_reminder_workflow(&json!({ "subscriptionId": Uuid::new_v4() }))
        .await;

    // then
    assert_eq!(response.status().as_u16(), 202);
}

#[tokio::test]
async fn trigger_rejects_invalid_payloads() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;
    let test_cases = vec![
        (json!({}), "missing subscription id"),
        (json!({ "subscriptionId": "not-a-uuid" }), "malformed subscription id"),
        (json!({ "subscription_id": Uuid::new_v4() }), "snake case field name"),
        (json!([]), "not an object"),
    ];

    for (body, description) in test_cases {
        // when
        let response = app.post_reminder_workflow(&body).await;

        // then
        assert!(
            response.status().is_client_error(),
            "The API did not reject the payload with {}, got {}",
            description,
            response.status()
        );
    }
}

#[tokio::test]
async fn workflow_run_reports_its_pending_state() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;
    let subscription_id = app.insert_subscription(date!(2024 - 01 - 31), SubscriptionStatus::Active);
    let run_id = app.trigger_reminder_workflow(subscription_id).await;

    // when
    let body = app.get_workflow_run_json(run_id).await;

    // then
    assert_eq!(body["workflowRunId"], run_id.to_string());
    assert_eq!(body["subscriptionId"], subscription_id.to_string());
    assert_eq!(body["status"], "pending");
    assert_eq!(body["abortReason"], serde_json::Value::Null);
    assert_eq!(body["nextStep"], 0);
}

#[tokio::test]
async fn unknown_workflow_run_returns_a_404() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;

    // when
    let response = app.get_workflow_run(Uuid::new_v4()).await;

    // then
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn malformed_workflow_run_id_is_rejected() {
    // given
    let app = TestApp::spawn(datetime!(2024-01-10 09:00 UTC)).await;

    // when
    let response = reqwest::get(format!(
        "http://{}/api/v1/workflows/definitely-not-a-uuid",
        app.address
    ))
    .await
    .unwrap();

    // then
    assert_eq!(response.status().as_u16(), 400);
}
