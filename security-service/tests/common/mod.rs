//! Shared setup for the security-service integration tests.
//!
//! Builds the full router over an in-memory directory and a recording
//! mailer, and drives it with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use security_service::{
    build_router,
    config::SecurityConfig,
    models::{Identity, Role},
    services::{metrics::init_metrics, InMemoryIdentityDirectory, RecordingMailer, SecurityCore},
    utils::{hash_password, Password},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "Correct#Horse9";
pub const NEW_PASSWORD: &str = "New#Secure99";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub directory: Arc<InMemoryIdentityDirectory>,
    pub mailer: Arc<RecordingMailer>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn test_config() -> SecurityConfig {
    let mut config = SecurityConfig::default();
    config.log_level = "error".to_string();
    config.reset.base_url = "https://church.example".to_string();
    config
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: SecurityConfig) -> Self {
        Self::with_mailer(config, RecordingMailer::new()).await
    }

    pub async fn with_mailer(config: SecurityConfig, mailer: RecordingMailer) -> Self {
        init_metrics().unwrap();

        let directory = Arc::new(InMemoryIdentityDirectory::new());
        let mailer = Arc::new(mailer);
        let core = SecurityCore::new(&config, directory.clone(), mailer.clone());
        let state = AppState::new(config, core);
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            directory,
            mailer,
        }
    }

    pub fn register(&self, email: &str, role: Role) -> Identity {
        let hash = hash_password(&Password::new(PASSWORD)).unwrap();
        self.directory.register("Test Member", email, role, hash)
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", "203.0.113.7")
            .header("user-agent", "integration-test");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::DELETE, uri, token, None).await
    }

    pub async fn try_login(&self, email: &str, password: &str) -> TestResponse {
        self.post(
            "/auth/login",
            None,
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    /// Log in and return the session token.
    pub async fn login(&self, email: &str) -> String {
        let response = self.try_login(email, PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        response.body["token"].as_str().unwrap().to_string()
    }
}
