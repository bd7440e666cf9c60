pub mod audit_event;
pub mod identity;
pub mod login_attempt;
pub mod reset_token;
pub mod session;
pub mod suspicious;

pub use audit_event::{
    AuditCategory, AuditDetails, AuditEvent, AuditEventType, AuditOutcome, AuditSeverity,
    DetailValue, NewAuditEvent, RiskFlags,
};
pub use identity::{normalize_email, Identity, Role};
pub use login_attempt::{FailureReason, LockoutInfo, LoginAttempt};
pub use reset_token::ResetToken;
pub use session::{Session, SessionInfo};
pub use suspicious::{
    ActivityStatus, AlertType, SecurityAlert, SuspiciousActivity, SuspiciousActivityType,
};
