mod common;

use axum::http::StatusCode;
use common::{TestApp, PASSWORD};
use security_service::models::Role;

#[tokio::test]
async fn test_login_returns_session_token() {
    let app = TestApp::spawn().await;
    let identity = app.register("Maria@Church.org", Role::Membro);

    let response = app.try_login("maria@church.org", PASSWORD).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["identity"]["id"], identity.id.as_str());
    assert_eq!(response.body["session"]["role"], "membro");
    assert!(response.body["session"].get("token").is_none());

    let token = response.body["token"].as_str().unwrap();
    let session = app.get("/auth/session", Some(token)).await;
    assert_eq!(session.status, StatusCode::OK);
    assert_eq!(session.body["identity"]["email"], "maria@church.org");
}

#[tokio::test]
async fn test_unknown_email_and_wrong_password_look_identical() {
    let app = TestApp::spawn().await;
    app.register("real@church.org", Role::Membro);

    let unknown = app.try_login("ghost@church.org", PASSWORD).await;
    let wrong = app.try_login("real@church.org", "Wrong#Pass1").await;

    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.body, wrong.body);
    assert_eq!(unknown.body["error"], "Invalid email or password");
}

#[tokio::test]
async fn test_malformed_login_body_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/auth/login",
            None,
            serde_json::json!({ "email": "not-an-email", "password": "x" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_repeated_failures_lock_the_account() {
    let app = TestApp::spawn().await;
    app.register("target@church.org", Role::Membro);

    for _ in 0..5 {
        let response = app.try_login("target@church.org", "Wrong#Pass1").await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    // Correct password no longer helps once locked
    let locked = app.try_login("target@church.org", PASSWORD).await;
    assert_eq!(locked.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(locked.body["success"], false);

    let retry_after: i64 = locked.headers["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 15 * 60);
}

#[tokio::test]
async fn test_address_lock_reports_its_own_retry_after() {
    let app = TestApp::spawn().await;
    app.register("fresh@church.org", Role::Membro);

    // One failure each for ten accounts, all from the test client's address
    for i in 0..10 {
        let response = app
            .try_login(&format!("guess{}@church.org", i), "Wrong#Pass1")
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let locked = app.try_login("fresh@church.org", PASSWORD).await;
    assert_eq!(locked.status, StatusCode::TOO_MANY_REQUESTS);

    let retry_after: i64 = locked.headers["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 14 * 60 && retry_after <= 15 * 60);
}

#[tokio::test]
async fn test_admin_can_inspect_and_clear_lockout() {
    let app = TestApp::spawn().await;
    app.register("admin@church.org", Role::Admin);
    app.register("target@church.org", Role::Membro);
    let admin = app.login("admin@church.org").await;

    for _ in 0..5 {
        app.try_login("target@church.org", "Wrong#Pass1").await;
    }

    let status = app.get("/auth/lockout/Target@Church.org", Some(&admin)).await;
    assert_eq!(status.status, StatusCode::OK);
    assert_eq!(status.body["email"], "target@church.org");
    assert_eq!(status.body["is_locked"], true);
    assert_eq!(status.body["failed_attempts"], 5);

    let cleared = app.delete("/auth/lockout/target@church.org", Some(&admin)).await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.body["cleared_attempts"], 5);

    let response = app.try_login("target@church.org", PASSWORD).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_lockout_endpoints_require_security_monitor() {
    let app = TestApp::spawn().await;
    app.register("pastor@church.org", Role::Pastor);
    let pastor = app.login("pastor@church.org").await;

    let response = app.get("/auth/lockout/anyone@church.org", Some(&pastor)).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("security:monitor"));
}
