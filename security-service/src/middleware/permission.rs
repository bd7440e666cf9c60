use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{
    models::{AuditOutcome, NewAuditEvent, RiskFlags, Session},
    services::{access, AccessDenied, Permission, SecurityCore, ServiceError},
    AppState,
};

/// State for [`require_permission`]: the app plus the permission a route
/// needs.
#[derive(Clone)]
pub struct PermissionGate {
    pub state: AppState,
    pub permission: Permission,
}

impl PermissionGate {
    pub fn new(state: AppState, permission: Permission) -> Self {
        Self { state, permission }
    }
}

/// Route layer that admits only sessions whose role holds the gate's
/// permission. Must run inside the session middleware.
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = req.extensions().get::<Session>().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Session missing from request extensions"
        ))
    })?;

    if let Err(denied) = access::require_permission(session.role, gate.permission) {
        let origin_ip = service_core::middleware::rate_limit::client_ip(&req).map(|ip| ip.to_string());
        record_denial(
            &gate.state.core,
            session,
            req.uri().path(),
            origin_ip.as_deref(),
            &denied,
        );
        return Err(ServiceError::Forbidden(denied).into());
    }

    Ok(next.run(req).await)
}

/// Log and audit a refused authorization check. Attempts on admin-only
/// permissions carry the privilege escalation flag.
pub fn record_denial(
    core: &SecurityCore,
    session: &Session,
    resource: &str,
    origin_ip: Option<&str>,
    denied: &AccessDenied,
) {
    let escalation = denied.required.iter().any(Permission::is_admin_only);

    tracing::warn!(
        identity_id = %session.identity_id,
        role = session.role.as_str(),
        resource = %resource,
        required = %denied,
        "Authorization denied"
    );

    let required: Vec<&str> = denied.required.iter().map(Permission::as_str).collect();
    core.audit.log(
        NewAuditEvent::authorization("permission_denied", AuditOutcome::Failure)
            .identity(Some(&session.identity_id), Some(&session.email))
            .session_id(&session.id)
            .origin(origin_ip, None)
            .resource(resource)
            .detail("required", required.join(","))
            .detail("role", session.role.as_str())
            .flags(RiskFlags {
                privilege_escalation: escalation,
                ..RiskFlags::default()
            }),
    );
}
