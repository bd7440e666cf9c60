use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a login attempt failed. Only ever visible in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    AccountLocked,
    UserNotFound,
    InvalidPassword,
    AccountDisabled,
    SystemError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::AccountLocked => "ACCOUNT_LOCKED",
            FailureReason::UserNotFound => "USER_NOT_FOUND",
            FailureReason::InvalidPassword => "INVALID_PASSWORD",
            FailureReason::AccountDisabled => "ACCOUNT_DISABLED",
            FailureReason::SystemError => "SYSTEM_ERROR",
        }
    }
}

/// One recorded call to login. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: String,
    /// Insertion order, breaks ties between attempts in the same millisecond
    pub sequence: u64,
    pub email: String,
    pub success: bool,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub failure_reason: Option<FailureReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockoutInfo {
    pub is_locked: bool,
    pub failed_attempts: usize,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub can_retry_at: Option<DateTime<Utc>>,
}
