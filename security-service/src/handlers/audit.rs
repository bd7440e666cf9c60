use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::audit::{AuditEventsParams, AuditEventsResponse, SummaryParams, SuspiciousActivityResponse},
    services::AuditQuery,
    AppState,
};

/// Filtered, paginated audit events, newest first
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<AuditEventsParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = AuditQuery::try_from(params)?;

    let events = state.core.audit_query.query(&query);
    let total = state.core.audit_query.count(&query);

    Ok(Json(AuditEventsResponse {
        events,
        total,
        offset: query.effective_offset(),
        limit: query.effective_limit(),
    }))
}

pub async fn summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> Result<impl IntoResponse, AppError> {
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "from must not be after to"
            )));
        }
    }

    Ok(Json(state.core.audit_query.summarize(params.from, params.to)))
}

/// Patterns detected in recent audit events. Brute force looks at the last
/// hour; privilege escalation and unusual login patterns look at the last
/// 24 hours.
pub async fn suspicious(State(state): State<AppState>) -> impl IntoResponse {
    let activities = state.core.audit_query.detect_suspicious();
    Json(SuspiciousActivityResponse {
        count: activities.len(),
        activities,
    })
}
