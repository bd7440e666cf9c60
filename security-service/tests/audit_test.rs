mod common;

use axum::http::StatusCode;
use common::{TestApp, PASSWORD};
use security_service::models::Role;

#[tokio::test]
async fn test_audit_requires_session_and_audit_read() {
    let app = TestApp::spawn().await;
    app.register("membro@church.org", Role::Membro);
    let member = app.login("membro@church.org").await;

    let anonymous = app.get("/audit/events", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let denied = app.get("/audit/events", Some(&member)).await;
    assert_eq!(denied.status, StatusCode::FORBIDDEN);
    assert_eq!(
        denied.body["error"],
        "Insufficient permissions: requires audit:read"
    );

    // The denial itself is audited
    let events = app.state.core.audit.snapshot();
    assert!(events
        .iter()
        .any(|e| e.action == "permission_denied"
            && e.identity_email.as_deref() == Some("membro@church.org")));
}

#[tokio::test]
async fn test_audit_events_filter_and_paginate() {
    let app = TestApp::spawn().await;
    app.register("pastor@church.org", Role::Pastor);
    app.register("maria@church.org", Role::Membro);
    let pastor = app.login("pastor@church.org").await;

    for _ in 0..3 {
        app.try_login("maria@church.org", "Wrong#Pass1").await;
    }

    let failures = app
        .get(
            "/audit/events?event_types=authentication&outcomes=failure&limit=2",
            Some(&pastor),
        )
        .await;
    assert_eq!(failures.status, StatusCode::OK);
    assert_eq!(failures.body["total"], 3);
    assert_eq!(failures.body["limit"], 2);
    let events = failures.body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| e["identity_email"] == "maria@church.org" && e["outcome"] == "FAILURE"));

    let bad = app
        .get("/audit/events?severities=apocalyptic", Some(&pastor))
        .await;
    assert_eq!(bad.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_audit_summary_counts_events() {
    let app = TestApp::spawn().await;
    app.register("pastor@church.org", Role::Pastor);
    let pastor = app.login("pastor@church.org").await;
    app.try_login("pastor@church.org", "Wrong#Pass1").await;

    let summary = app.get("/audit/summary", Some(&pastor)).await;

    assert_eq!(summary.status, StatusCode::OK);
    assert!(summary.body["total"].as_u64().unwrap() >= 3);
    assert_eq!(summary.body["by_outcome"]["FAILURE"], 1);
    assert!(summary.body["risk_distribution"].as_array().is_some());
}

#[tokio::test]
async fn test_brute_force_is_reported_as_suspicious() {
    let app = TestApp::spawn().await;
    app.register("admin@church.org", Role::Admin);
    app.register("target@church.org", Role::Membro);
    let admin = app.login("admin@church.org").await;

    for _ in 0..6 {
        app.try_login("target@church.org", "Wrong#Pass1").await;
    }

    let response = app.get("/audit/suspicious", Some(&admin)).await;

    assert_eq!(response.status, StatusCode::OK);
    let activities = response.body["activities"].as_array().unwrap();
    assert!(activities
        .iter()
        .any(|a| a["activity_type"] == "BRUTE_FORCE"));
}

#[tokio::test]
async fn test_monitor_alerts_are_listed_newest_first() {
    let app = TestApp::spawn().await;
    app.register("admin@church.org", Role::Admin);
    let admin = app.login("admin@church.org").await;

    for _ in 0..10 {
        app.try_login("ghost@church.org", PASSWORD).await;
    }
    let raised = app.state.core.monitor.scan();
    assert!(!raised.is_empty());

    let response = app.get("/security/alerts?limit=5", Some(&admin)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["count"], raised.len().min(5));
    assert!(response.body["alerts"]
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a["email"] == "ghost@church.org"));
}
