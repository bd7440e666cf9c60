use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::audit::{AlertsParams, AlertsResponse, ClearLockoutResponse, LockoutResponse},
    middleware::CurrentSession,
    models::normalize_email,
    AppState,
};

/// Lockout state of an email
pub async fn lockout_status(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> impl IntoResponse {
    let info = state.core.ledger.lockout_info(&email);
    Json(LockoutResponse {
        email: normalize_email(&email),
        info,
    })
}

/// Forget the failures recorded against an email, lifting any lockout
pub async fn clear_lockout(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let operator = state.core.directory.find_by_id(&session.identity_id).await?;
    let cleared_attempts = state.core.ledger.clear(&email, operator.as_ref());

    tracing::info!(
        email = %normalize_email(&email),
        cleared_by = %session.identity_id,
        cleared_attempts,
        "Lockout cleared"
    );

    Ok(Json(ClearLockoutResponse {
        email: normalize_email(&email),
        cleared_attempts,
    }))
}

/// Most recent monitor alerts, newest first
pub async fn alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertsParams>,
) -> impl IntoResponse {
    let alerts = state.core.monitor.recent_alerts(params.effective_limit());
    Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    })
}
