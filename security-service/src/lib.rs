pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::SecurityConfig;
use crate::middleware::{
    metrics_middleware, require_permission, session_middleware, PermissionGate,
};
use crate::services::{Permission, SecurityCore};

#[derive(Clone)]
pub struct AppState {
    pub core: SecurityCore,
    pub config: SecurityConfig,
    pub login_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: SecurityConfig, core: SecurityCore) -> Self {
        let limits = &config.rate_limit;
        let login_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);
        let password_reset_rate_limiter =
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds);

        Self {
            core,
            config,
            login_rate_limiter,
            password_reset_rate_limiter,
        }
    }
}

/// Router whose routes all require `permission` on top of a live session.
fn gated(state: &AppState, permission: Permission, routes: Router<AppState>) -> Router<AppState> {
    routes.route_layer(from_fn_with_state(
        PermissionGate::new(state.clone(), permission),
        require_permission,
    ))
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let reset_request_route = Router::new()
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .layer(from_fn_with_state(
            state.password_reset_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let lockout_routes = gated(
        &state,
        Permission::SecurityMonitor,
        Router::new()
            .route(
                "/auth/lockout/:email",
                get(handlers::security::lockout_status).delete(handlers::security::clear_lockout),
            )
            .route("/audit/suspicious", get(handlers::audit::suspicious))
            .route("/security/alerts", get(handlers::security::alerts)),
    );

    let audit_routes = gated(
        &state,
        Permission::AuditRead,
        Router::new()
            .route("/audit/events", get(handlers::audit::list_events))
            .route("/audit/summary", get(handlers::audit::summary)),
    );

    let session_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/session", get(handlers::auth::current_session))
        .route("/auth/session/refresh", post(handlers::auth::refresh_session))
        .route("/auth/sessions", get(handlers::auth::list_sessions))
        .route(
            "/auth/sessions/:identity_id",
            delete(handlers::auth::revoke_sessions),
        )
        .route("/auth/password/change", post(handlers::auth::change_password))
        .route("/auth/permissions", get(handlers::auth::permissions))
        .merge(lockout_routes)
        .merge(audit_routes)
        .layer(from_fn_with_state(state.clone(), session_middleware));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/auth/password/strength",
            post(handlers::auth::password_strength),
        )
        .route(
            "/auth/password-reset/validate",
            get(handlers::auth::validate_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .merge(login_route)
        .merge(reset_request_route)
        .merge(session_routes)
        .with_state(state.clone())
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&state.config.allowed_origins));

    Ok(app)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([
            header::RETRY_AFTER,
            header::HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

/// Liveness plus the size of each in-memory store
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let core = &state.core;
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "stores": {
            "sessions": core.sessions.active_count(),
            "audit_events": core.audit.len(),
            "login_attempts": core.ledger.len(),
            "reset_tokens": core.password_reset.len(),
        }
    }))
}
