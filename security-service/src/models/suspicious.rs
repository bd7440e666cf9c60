use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuditSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspiciousActivityType {
    BruteForce,
    PrivilegeEscalation,
    UnusualLoginPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Detected,
}

/// Pattern found in the audit window. Derived on demand, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct SuspiciousActivity {
    pub activity_type: SuspiciousActivityType,
    pub description: String,
    pub risk_score: u8,
    /// Ids of the audit events that matched
    pub related_events: Vec<String>,
    pub affected_identities: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub status: ActivityStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    RapidAttempts,
    MultipleIps,
    UnusualHours,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::RapidAttempts => "RAPID_ATTEMPTS",
            AlertType::MultipleIps => "MULTIPLE_IPS",
            AlertType::UnusualHours => "UNUSUAL_HOURS",
        }
    }
}

/// Operator-facing finding raised from the login attempt ledger.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAlert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: AuditSeverity,
    pub message: String,
    pub email: Option<String>,
    pub origin_ip: Option<String>,
    pub attempt_count: usize,
    pub created_at: DateTime<Utc>,
}
