use stagehand_core::prelude::*;
use stagehand_mock::*;
use stagehand_provision::prelude::*;
use stagehand_server::prelude::*;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

fn provisioner(services: MockServices) -> Provisioner<MockServices> {
    Provisioner::new(services, ProvisionConfig::default().without_waits())
}

fn app(provisioner: &Provisioner<MockServices>) -> Router {
    StagehandServer::default().build(provisioner.clone())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_answers_ok() {
    let p = provisioner(mock_services(InMemoryBackend::new(), ScriptedManagement::new()));

    let response = app(&p).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn submitted_environment_can_be_polled_to_completion() {
    let p = provisioner(mock_services(InMemoryBackend::new(), ScriptedManagement::new()));

    let response = app(&p)
        .oneshot(post_json("/environments", json!({ "capabilities": ["crm"] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = json_body(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(!job_id.is_empty());

    p.wait_terminal(&job_id, Duration::from_secs(10)).await.unwrap();

    let response = app(&p)
        .oneshot(get(&format!("/environments/jobs/{job_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = json_body(response).await;
    assert_eq!(view["status"], "completed");
    assert!(view["result_url"].as_str().unwrap().starts_with("http://localhost:"));
    assert!(!view["log"].as_array().unwrap().is_empty());
    assert_eq!(
        view["log"].as_array().unwrap().len(),
        view["entries"].as_array().unwrap().len()
    );
}

#[tokio::test]
async fn empty_capabilities_are_rejected_without_a_job() {
    let p = provisioner(mock_services(InMemoryBackend::new(), ScriptedManagement::new()));

    let response = app(&p)
        .oneshot(post_json("/environments", json!({ "capabilities": [" ", ""] })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(p.store().is_empty());
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let p = provisioner(mock_services(InMemoryBackend::new(), ScriptedManagement::new()));

    let response = app(&p)
        .oneshot(get("/environments/jobs/does-not-exist"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await, json!({ "status": "not_found" }));
}

#[tokio::test]
async fn history_lists_completed_environments() {
    let p = provisioner(mock_services(InMemoryBackend::new(), ScriptedManagement::new()));

    let response = app(&p).oneshot(get("/environments/history")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));

    let accepted = p.submit(ProvisionRequest::new(["base"])).unwrap();
    let job = p
        .wait_terminal(&accepted.job_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let response = app(&p).oneshot(get("/environments/history")).await.unwrap();
    let records = json_body(response).await;
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["url"], json!(job.result_url.unwrap()));
}

#[tokio::test]
async fn unreadable_history_is_a_server_error() {
    let mut services = mock_services(InMemoryBackend::new(), ScriptedManagement::new());
    services.history = MemoryHistory::failing();
    let p = provisioner(services);

    let response = app(&p).oneshot(get("/environments/history")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn environment_routes_honour_the_prefix() {
    let p = provisioner(mock_services(InMemoryBackend::new(), ScriptedManagement::new()));
    let app = StagehandServer::new(ServerConfig {
        route_prefix: "/api/".into(),
    })
    .build(p.clone());

    let response = app
        .clone()
        .oneshot(get("/api/environments/history"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/environments/history")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
