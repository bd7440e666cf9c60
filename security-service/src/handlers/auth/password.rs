use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::auth::{
        ChangePasswordRequest, MessageResponse, PasswordResetConfirm, PasswordResetRequest,
        PasswordResetValidateQuery, PasswordResetValidateResponse, PasswordStrengthRequest,
        PasswordStrengthResponse,
    },
    middleware::{ClientInfo, CurrentSession},
    services::{PolicyService, ServiceError},
    utils::{Password, ValidatedJson},
    AppState,
};

const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for this email, a password reset link has been sent.";

/// Change the caller's password. Other sessions are revoked.
pub async fn change_password(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .core
        .authenticator
        .change_password(
            &session.identity_id,
            &Password::new(req.current_password),
            &Password::new(req.new_password),
            Some(&session.token),
        )
        .await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password changed successfully")),
    ))
}

/// Policy check and strength score for a candidate password
pub async fn password_strength(
    ValidatedJson(req): ValidatedJson<PasswordStrengthRequest>,
) -> impl IntoResponse {
    let report = PolicyService::validate_password(&req.password);
    let strength = PolicyService::strength(&req.password);

    Json(PasswordStrengthResponse {
        valid: report.valid,
        messages: report.messages(),
        violations: report.violations,
        score: strength.score,
        level: strength.level,
    })
}

/// Request a password reset email. The answer never reveals whether the
/// account exists.
pub async fn request_password_reset(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> impl IntoResponse {
    if let Err(e) = state
        .core
        .password_reset
        .request_reset(&req.email, client.origin_ip())
        .await
    {
        tracing::error!(error = ?e, "Password reset request failed");
    }

    (
        StatusCode::OK,
        Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)),
    )
}

/// Whether a reset token can still be used
pub async fn validate_password_reset(
    State(state): State<AppState>,
    Query(query): Query<PasswordResetValidateQuery>,
) -> impl IntoResponse {
    let record = state.core.password_reset.validate(&query.token);
    Json(PasswordResetValidateResponse {
        valid: record.is_some(),
        expires_at: record.map(|r| r.expires_at),
    })
}

/// Set a new password with a reset token
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    let report = PolicyService::validate_password(&req.new_password);
    if !report.valid {
        return Err(ServiceError::Validation(report.violations).into());
    }

    if !state
        .core
        .password_reset
        .consume(&req.token, &Password::new(req.new_password))
        .await
    {
        return Err(ServiceError::InvalidToken.into());
    }

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password has been reset successfully")),
    ))
}
