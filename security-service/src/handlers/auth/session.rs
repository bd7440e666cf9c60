use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;

use crate::{
    dtos::auth::{
        CurrentSessionResponse, LoginRequest, MessageResponse, PermissionsResponse,
        RefreshResponse, RevokeSessionsResponse, SessionListResponse,
    },
    middleware::{permission::record_denial, ClientInfo, CurrentSession},
    models::SessionInfo,
    services::{access, LoginFailure, Permission, ServiceError},
    utils::{Password, ValidatedJson},
    AppState,
};

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Response, AppError> {
    let result = state
        .core
        .authenticator
        .authenticate(
            &req.email,
            &Password::new(req.password),
            client.origin_ip(),
            client.user_agent(),
            req.remember_me,
        )
        .await;

    let response = match result.failure {
        None => (StatusCode::OK, Json(result)).into_response(),
        Some(LoginFailure::InvalidCredentials) => {
            (StatusCode::UNAUTHORIZED, Json(result)).into_response()
        }
        Some(LoginFailure::Internal) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(result)).into_response()
        }
        Some(LoginFailure::Locked) => {
            let retry_after = state
                .core
                .ledger
                .retry_at(&req.email, client.origin_ip())
                .map(|at| (at - Utc::now()).num_seconds().max(1))
                .unwrap_or(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(result),
            )
                .into_response()
        }
    };

    Ok(response)
}

/// End the calling session
pub async fn logout(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    state.core.authenticator.logout(&session.token);
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// The calling session and the identity behind it
pub async fn current_session(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    let identity = state.core.directory.find_by_id(&session.identity_id).await?;
    Ok(Json(CurrentSessionResponse {
        session: SessionInfo::from(&session),
        identity,
    }))
}

/// Extend the calling session. The token stays the same.
pub async fn refresh_session(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    let refreshed = state
        .core
        .sessions
        .refresh(&session.token)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired session")))?;

    Ok(Json(RefreshResponse {
        token: refreshed.token.clone(),
        session: SessionInfo::from(&refreshed),
    }))
}

/// Live sessions of the caller, newest first
pub async fn list_sessions(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<impl IntoResponse, AppError> {
    let sessions: Vec<SessionInfo> = state
        .core
        .sessions
        .active_sessions_for(&session.identity_id)
        .iter()
        .map(SessionInfo::from)
        .collect();

    Ok(Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    }))
}

/// Revoke every session of an identity. Callers revoking their own sessions
/// keep the one making the request.
pub async fn revoke_sessions(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    client: ClientInfo,
    Path(identity_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(denied) = access::require_self_or_permission(
        &session.identity_id,
        session.role,
        &identity_id,
        Permission::SessionManage,
    ) {
        record_denial(
            &state.core,
            &session,
            &format!("auth/sessions/{}", identity_id),
            client.origin_ip(),
            &denied,
        );
        return Err(ServiceError::Forbidden(denied).into());
    }

    let keep = (identity_id == session.identity_id).then_some(session.token.as_str());
    let revoked = state.core.sessions.destroy_all_for(&identity_id, keep);

    Ok(Json(RevokeSessionsResponse {
        identity_id,
        revoked,
    }))
}

/// Permissions held by the caller's role
pub async fn permissions(CurrentSession(session): CurrentSession) -> impl IntoResponse {
    Json(PermissionsResponse {
        role: session.role,
        level: session.role.level(),
        permissions: access::role_permissions_for(session.role),
    })
}
