//! Security audit events and their risk score.
//!
//! The score is computed once when an event is recorded:
//! `base(event_type) * severity factor * outcome factor + flag bonuses`,
//! clamped to `[0, 100]` and rounded half away from zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    Authentication,
    Authorization,
    UserManagement,
    PasswordChange,
    SessionManagement,
    DataAccess,
    DataModification,
    SystemConfiguration,
    SecurityViolation,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Authentication => "AUTHENTICATION",
            AuditEventType::Authorization => "AUTHORIZATION",
            AuditEventType::UserManagement => "USER_MANAGEMENT",
            AuditEventType::PasswordChange => "PASSWORD_CHANGE",
            AuditEventType::SessionManagement => "SESSION_MANAGEMENT",
            AuditEventType::DataAccess => "DATA_ACCESS",
            AuditEventType::DataModification => "DATA_MODIFICATION",
            AuditEventType::SystemConfiguration => "SYSTEM_CONFIGURATION",
            AuditEventType::SecurityViolation => "SECURITY_VIOLATION",
        }
    }

    pub fn base_score(&self) -> f64 {
        match self {
            AuditEventType::Authentication => 20.0,
            AuditEventType::Authorization => 30.0,
            AuditEventType::UserManagement => 25.0,
            AuditEventType::PasswordChange => 35.0,
            AuditEventType::SessionManagement => 15.0,
            AuditEventType::DataAccess => 10.0,
            AuditEventType::DataModification => 20.0,
            AuditEventType::SystemConfiguration => 50.0,
            AuditEventType::SecurityViolation => 80.0,
        }
    }
}

/// Coarse grouping used by dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    Authentication,
    Authorization,
    Administration,
    Session,
    Security,
    Data,
    System,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Authentication => "AUTHENTICATION",
            AuditCategory::Authorization => "AUTHORIZATION",
            AuditCategory::Administration => "ADMINISTRATION",
            AuditCategory::Session => "SESSION",
            AuditCategory::Security => "SECURITY",
            AuditCategory::Data => "DATA",
            AuditCategory::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditSeverity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Info => "INFO",
            AuditSeverity::Low => "LOW",
            AuditSeverity::Medium => "MEDIUM",
            AuditSeverity::High => "HIGH",
            AuditSeverity::Critical => "CRITICAL",
        }
    }

    pub fn factor(&self) -> f64 {
        match self {
            AuditSeverity::Info => 0.5,
            AuditSeverity::Low => 1.0,
            AuditSeverity::Medium => 1.5,
            AuditSeverity::High => 2.0,
            AuditSeverity::Critical => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure,
    Partial,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "SUCCESS",
            AuditOutcome::Failure => "FAILURE",
            AuditOutcome::Partial => "PARTIAL",
        }
    }

    pub fn factor(&self) -> f64 {
        match self {
            AuditOutcome::Success => 1.0,
            AuditOutcome::Failure => 1.5,
            AuditOutcome::Partial => 1.2,
        }
    }
}

/// The closed set of boolean signals that feed the risk score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags {
    #[serde(default)]
    pub multiple_failed_attempts: bool,
    #[serde(default)]
    pub privilege_escalation: bool,
    #[serde(default)]
    pub outside_business_hours: bool,
    #[serde(default)]
    pub unusual_location: bool,
}

impl RiskFlags {
    pub fn bonus(&self) -> f64 {
        let mut bonus = 0.0;
        if self.multiple_failed_attempts {
            bonus += 20.0;
        }
        if self.privilege_escalation {
            bonus += 30.0;
        }
        if self.outside_business_hours {
            bonus += 15.0;
        }
        if self.unusual_location {
            bonus += 25.0;
        }
        bonus
    }
}

/// Display-only primitive value attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for DetailValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailValue::Bool(v) => write!(f, "{}", v),
            DetailValue::Int(v) => write!(f, "{}", v),
            DetailValue::Float(v) => write!(f, "{}", v),
            DetailValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        DetailValue::Bool(v)
    }
}

impl From<i64> for DetailValue {
    fn from(v: i64) -> Self {
        DetailValue::Int(v)
    }
}

impl From<usize> for DetailValue {
    fn from(v: usize) -> Self {
        DetailValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for DetailValue {
    fn from(v: f64) -> Self {
        DetailValue::Float(v)
    }
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        DetailValue::Text(v.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        DetailValue::Text(v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditDetails {
    #[serde(default)]
    pub flags: RiskFlags,
    #[serde(default)]
    pub extra: BTreeMap<String, DetailValue>,
}

/// Event as submitted to the recorder, before id, sequence, timestamp and
/// score are stamped on.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    pub category: AuditCategory,
    pub severity: AuditSeverity,
    pub identity_id: Option<String>,
    pub identity_email: Option<String>,
    pub target_identity_id: Option<String>,
    pub target_email: Option<String>,
    pub session_id: Option<String>,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
    pub resource: Option<String>,
    pub action: String,
    pub details: AuditDetails,
    pub outcome: AuditOutcome,
    pub tags: Vec<String>,
}

impl NewAuditEvent {
    pub fn new(
        event_type: AuditEventType,
        category: AuditCategory,
        severity: AuditSeverity,
        action: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_type,
            category,
            severity,
            identity_id: None,
            identity_email: None,
            target_identity_id: None,
            target_email: None,
            session_id: None,
            origin_ip: None,
            user_agent: None,
            resource: None,
            action: action.into(),
            details: AuditDetails::default(),
            outcome,
            tags: Vec::new(),
        }
    }

    fn by_outcome(
        outcome: AuditOutcome,
        success: AuditSeverity,
        partial: AuditSeverity,
        failure: AuditSeverity,
    ) -> AuditSeverity {
        match outcome {
            AuditOutcome::Success => success,
            AuditOutcome::Partial => partial,
            AuditOutcome::Failure => failure,
        }
    }

    pub fn authentication(action: impl Into<String>, outcome: AuditOutcome) -> Self {
        let severity = Self::by_outcome(
            outcome,
            AuditSeverity::Info,
            AuditSeverity::Low,
            AuditSeverity::Medium,
        );
        Self::new(
            AuditEventType::Authentication,
            AuditCategory::Authentication,
            severity,
            action,
            outcome,
        )
        .tag("authentication")
    }

    pub fn authorization(action: impl Into<String>, outcome: AuditOutcome) -> Self {
        let severity = Self::by_outcome(
            outcome,
            AuditSeverity::Info,
            AuditSeverity::Low,
            AuditSeverity::Medium,
        );
        Self::new(
            AuditEventType::Authorization,
            AuditCategory::Authorization,
            severity,
            action,
            outcome,
        )
        .tag("authorization")
    }

    pub fn user_management(action: impl Into<String>, outcome: AuditOutcome) -> Self {
        let severity = Self::by_outcome(
            outcome,
            AuditSeverity::Low,
            AuditSeverity::Low,
            AuditSeverity::Medium,
        );
        Self::new(
            AuditEventType::UserManagement,
            AuditCategory::Administration,
            severity,
            action,
            outcome,
        )
        .tag("user_management")
    }

    pub fn password(action: impl Into<String>, outcome: AuditOutcome) -> Self {
        let severity = Self::by_outcome(
            outcome,
            AuditSeverity::Low,
            AuditSeverity::Medium,
            AuditSeverity::High,
        );
        Self::new(
            AuditEventType::PasswordChange,
            AuditCategory::Authentication,
            severity,
            action,
            outcome,
        )
        .tag("password")
    }

    pub fn session(action: impl Into<String>, outcome: AuditOutcome) -> Self {
        let severity = Self::by_outcome(
            outcome,
            AuditSeverity::Info,
            AuditSeverity::Info,
            AuditSeverity::Low,
        );
        Self::new(
            AuditEventType::SessionManagement,
            AuditCategory::Session,
            severity,
            action,
            outcome,
        )
        .tag("session")
    }

    /// Always a failure; defaults to HIGH severity.
    pub fn security_violation(action: impl Into<String>) -> Self {
        Self::new(
            AuditEventType::SecurityViolation,
            AuditCategory::Security,
            AuditSeverity::High,
            action,
            AuditOutcome::Failure,
        )
        .tag("security")
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn identity(mut self, id: Option<&str>, email: Option<&str>) -> Self {
        self.identity_id = id.map(str::to_string);
        self.identity_email = email.map(str::to_string);
        self
    }

    pub fn target(mut self, id: Option<&str>, email: Option<&str>) -> Self {
        self.target_identity_id = id.map(str::to_string);
        self.target_email = email.map(str::to_string);
        self
    }

    pub fn session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn origin(mut self, origin_ip: Option<&str>, user_agent: Option<&str>) -> Self {
        self.origin_ip = origin_ip.map(str::to_string);
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Into<DetailValue>) -> Self {
        self.details.extra.insert(key.into(), value.into());
        self
    }

    pub fn flags(mut self, flags: RiskFlags) -> Self {
        self.details.flags = flags;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn risk_score(&self) -> u8 {
        risk_score(
            self.event_type,
            self.severity,
            self.outcome,
            &self.details.flags,
        )
    }
}

/// Pure risk score for an event's classification and flags.
pub fn risk_score(
    event_type: AuditEventType,
    severity: AuditSeverity,
    outcome: AuditOutcome,
    flags: &RiskFlags,
) -> u8 {
    let raw = event_type.base_score() * severity.factor() * outcome.factor() + flags.bonus();
    raw.clamp(0.0, 100.0).round() as u8
}

/// A recorded, immutable audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub sequence: u64,
    pub event_type: AuditEventType,
    pub category: AuditCategory,
    pub severity: AuditSeverity,
    pub identity_id: Option<String>,
    pub identity_email: Option<String>,
    pub target_identity_id: Option<String>,
    pub target_email: Option<String>,
    pub session_id: Option<String>,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
    pub resource: Option<String>,
    pub action: String,
    pub details: AuditDetails,
    pub outcome: AuditOutcome,
    pub tags: Vec<String>,
    pub risk_score: u8,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn from_new(id: String, sequence: u64, new: NewAuditEvent, timestamp: DateTime<Utc>) -> Self {
        let risk_score = new.risk_score();
        Self {
            id,
            sequence,
            event_type: new.event_type,
            category: new.category,
            severity: new.severity,
            identity_id: new.identity_id,
            identity_email: new.identity_email,
            target_identity_id: new.target_identity_id,
            target_email: new.target_email,
            session_id: new.session_id,
            origin_ip: new.origin_ip,
            user_agent: new.user_agent,
            resource: new.resource,
            action: new.action,
            details: new.details,
            outcome: new.outcome,
            tags: new.tags,
            risk_score,
            timestamp,
        }
    }

    /// Email if known, otherwise the identity id.
    pub fn actor_key(&self) -> Option<&str> {
        self.identity_email
            .as_deref()
            .or(self.identity_id.as_deref())
    }
}
