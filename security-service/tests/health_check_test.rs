mod common;

use axum::http::StatusCode;
use common::TestApp;
use security_service::models::Role;

#[tokio::test]
async fn test_health_reports_store_sizes() {
    let app = TestApp::spawn().await;
    app.register("maria@church.org", Role::Membro);
    app.login("maria@church.org").await;

    let response = app.get("/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["service"], "security-service");
    assert_eq!(response.body["stores"]["sessions"], 1);
    assert_eq!(response.body["stores"]["login_attempts"], 1);
}

#[tokio::test]
async fn test_metrics_exposes_prometheus_text() {
    let app = TestApp::spawn().await;
    app.get("/health", None).await;

    let response = app.get("/metrics", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let text = response.body.as_str().unwrap();
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::spawn().await;

    let response = app.get("/health", None).await;

    assert!(response.headers.contains_key("x-request-id"));
}
