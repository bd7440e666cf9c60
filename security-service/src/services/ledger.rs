//! Rolling record of login attempts and the lockout decision built on it.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    normalize_email, AuditOutcome, FailureReason, Identity, LockoutInfo, LoginAttempt,
    NewAuditEvent, RiskFlags,
};
use crate::services::{metrics, AuditRecorder};

/// Failures inside the window at which an attempt is flagged as part of a
/// repeated-failure run.
const MULTIPLE_FAILURES_FLAG: usize = 3;

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Failed attempts per email inside the window before lockout. The
    /// per-IP limit is twice this.
    pub max_attempts: u32,
    pub window: Duration,
    pub retention: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::minutes(15),
            retention: Duration::hours(1),
        }
    }
}

impl LedgerSettings {
    fn email_limit(&self) -> usize {
        self.max_attempts as usize
    }

    fn ip_limit(&self) -> usize {
        self.max_attempts as usize * 2
    }
}

pub struct LoginAttemptLedger {
    attempts: RwLock<VecDeque<LoginAttempt>>,
    sequence: AtomicU64,
    settings: LedgerSettings,
    audit: Arc<AuditRecorder>,
}

impl LoginAttemptLedger {
    pub fn new(settings: LedgerSettings, audit: Arc<AuditRecorder>) -> Self {
        Self {
            attempts: RwLock::new(VecDeque::new()),
            sequence: AtomicU64::new(0),
            settings,
            audit,
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    /// Append an attempt, prune expired entries and emit the matching
    /// AUTHENTICATION audit event.
    pub fn record(
        &self,
        email: &str,
        success: bool,
        origin_ip: Option<&str>,
        user_agent: Option<&str>,
        failure_reason: Option<FailureReason>,
    ) -> LoginAttempt {
        self.record_at(email, success, origin_ip, user_agent, failure_reason, Utc::now())
    }

    pub(crate) fn record_at(
        &self,
        email: &str,
        success: bool,
        origin_ip: Option<&str>,
        user_agent: Option<&str>,
        failure_reason: Option<FailureReason>,
        now: DateTime<Utc>,
    ) -> LoginAttempt {
        let email = normalize_email(email);
        let window_start = now - self.settings.window;

        let (attempt, failures) = {
            let mut attempts = self.attempts.write();
            let attempt = LoginAttempt {
                id: Uuid::new_v4().to_string(),
                sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
                email: email.clone(),
                success,
                origin_ip: origin_ip.map(str::to_string),
                user_agent: user_agent.map(str::to_string),
                timestamp: now,
                failure_reason: if success { None } else { failure_reason },
            };
            attempts.push_back(attempt.clone());

            let horizon = now - self.settings.retention;
            attempts.retain(|a| a.timestamp >= horizon);

            let failures = attempts
                .iter()
                .filter(|a| !a.success && a.email == email && a.timestamp > window_start)
                .count();
            (attempt, failures)
        };

        if success {
            metrics::record_login("success");
        } else {
            metrics::record_login("failure");
            if failures == self.settings.email_limit() {
                metrics::record_lockout();
                tracing::warn!(
                    email = %email,
                    failed_attempts = failures,
                    "Email reached the failed login threshold"
                );
            }
        }

        let mut event = NewAuditEvent::authentication(
            if success { "login_success" } else { "login_failure" },
            if success {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            },
        )
        .identity(None, Some(&email))
        .origin(origin_ip, user_agent)
        .resource("auth/login");

        if let Some(reason) = attempt.failure_reason {
            event = event.detail("failure_reason", reason.as_str());
        }
        if !success && failures >= MULTIPLE_FAILURES_FLAG {
            event = event
                .detail("failed_attempts", failures)
                .flags(RiskFlags {
                    multiple_failed_attempts: true,
                    ..RiskFlags::default()
                });
        }
        self.audit.log_at(event, now);

        attempt
    }

    /// Whether `email` (and `origin_ip`, when known) may try to log in now.
    pub fn may_attempt(&self, email: &str, origin_ip: Option<&str>) -> bool {
        self.may_attempt_at(email, origin_ip, Utc::now())
    }

    pub(crate) fn may_attempt_at(
        &self,
        email: &str,
        origin_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        let email = normalize_email(email);
        let window_start = now - self.settings.window;
        let attempts = self.attempts.read();

        let recent_failures = || {
            attempts
                .iter()
                .filter(move |a| !a.success && a.timestamp > window_start)
        };

        let email_failures = recent_failures().filter(|a| a.email == email).count();
        if email_failures >= self.settings.email_limit() {
            return false;
        }

        if let Some(ip) = origin_ip {
            let ip_failures = recent_failures()
                .filter(|a| a.origin_ip.as_deref() == Some(ip))
                .count();
            if ip_failures >= self.settings.ip_limit() {
                return false;
            }
        }

        true
    }

    pub fn is_locked(&self, email: &str) -> bool {
        !self.may_attempt(email, None)
    }

    pub fn lockout_info(&self, email: &str) -> LockoutInfo {
        self.lockout_info_at(email, Utc::now())
    }

    pub(crate) fn lockout_info_at(&self, email: &str, now: DateTime<Utc>) -> LockoutInfo {
        let email = normalize_email(email);
        let window_start = now - self.settings.window;
        let attempts = self.attempts.read();

        let failures: Vec<&LoginAttempt> = attempts
            .iter()
            .filter(|a| !a.success && a.email == email && a.timestamp > window_start)
            .collect();
        let last_failure = failures.iter().map(|a| a.timestamp).max();
        let is_locked = failures.len() >= self.settings.email_limit();

        LockoutInfo {
            is_locked,
            failed_attempts: failures.len(),
            last_attempt_at: last_failure,
            can_retry_at: if is_locked {
                last_failure.map(|at| at + self.settings.window)
            } else {
                None
            },
        }
    }

    /// When a login for `email` from `origin_ip` will be allowed again, or
    /// None if it is allowed now. Each lock that applies ends one window
    /// after its latest failure; the later one wins.
    pub fn retry_at(&self, email: &str, origin_ip: Option<&str>) -> Option<DateTime<Utc>> {
        self.retry_at_at(email, origin_ip, Utc::now())
    }

    pub(crate) fn retry_at_at(
        &self,
        email: &str,
        origin_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let email = normalize_email(email);
        let window_start = now - self.settings.window;
        let attempts = self.attempts.read();

        let by_email = self.lock_end(&attempts, window_start, self.settings.email_limit(), |a| {
            a.email == email
        });
        let by_ip = origin_ip.and_then(|ip| {
            self.lock_end(&attempts, window_start, self.settings.ip_limit(), |a| {
                a.origin_ip.as_deref() == Some(ip)
            })
        });

        by_email.max(by_ip)
    }

    fn lock_end(
        &self,
        attempts: &VecDeque<LoginAttempt>,
        window_start: DateTime<Utc>,
        limit: usize,
        matches: impl Fn(&LoginAttempt) -> bool,
    ) -> Option<DateTime<Utc>> {
        let failures: Vec<DateTime<Utc>> = attempts
            .iter()
            .filter(|a| !a.success && a.timestamp > window_start && matches(a))
            .map(|a| a.timestamp)
            .collect();
        if failures.len() < limit {
            return None;
        }
        failures.into_iter().max().map(|at| at + self.settings.window)
    }

    /// Snapshot of attempts at or after `cutoff`, oldest first.
    pub fn attempts_since(&self, cutoff: DateTime<Utc>) -> Vec<LoginAttempt> {
        self.attempts
            .read()
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Utc::now())
    }

    pub(crate) fn prune_expired_at(&self, now: DateTime<Utc>) -> usize {
        let horizon = now - self.settings.retention;
        let mut attempts = self.attempts.write();
        let before = attempts.len();
        attempts.retain(|a| a.timestamp >= horizon);
        before - attempts.len()
    }

    /// Forget the failed attempts of `email`, lifting any lockout.
    pub fn clear(&self, email: &str, cleared_by: Option<&Identity>) -> usize {
        let email = normalize_email(email);
        let removed = {
            let mut attempts = self.attempts.write();
            let before = attempts.len();
            attempts.retain(|a| a.success || a.email != email);
            before - attempts.len()
        };

        tracing::info!(
            email = %email,
            removed,
            cleared_by = cleared_by.map(|i| i.id.as_str()).unwrap_or("-"),
            "Login lockout cleared"
        );

        self.audit.log(
            NewAuditEvent::user_management("lockout_cleared", AuditOutcome::Success)
                .identity(
                    cleared_by.map(|i| i.id.as_str()),
                    cleared_by.map(|i| i.email.as_str()),
                )
                .target(None, Some(&email))
                .detail("removed_attempts", removed),
        );

        removed
    }

    pub fn len(&self) -> usize {
        self.attempts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditEventType;
    use crate::services::AuditSettings;

    fn ledger() -> (LoginAttemptLedger, Arc<AuditRecorder>) {
        let audit = Arc::new(AuditRecorder::new(AuditSettings::default()));
        (
            LoginAttemptLedger::new(LedgerSettings::default(), audit.clone()),
            audit,
        )
    }

    fn fail(ledger: &LoginAttemptLedger, email: &str, ip: &str, at: DateTime<Utc>) {
        ledger.record_at(
            email,
            false,
            Some(ip),
            None,
            Some(FailureReason::InvalidPassword),
            at,
        );
    }

    #[test]
    fn test_lockout_after_threshold() {
        let (ledger, _) = ledger();
        let now = Utc::now();

        for i in 0..4 {
            fail(&ledger, "victim@x.com", "10.0.0.1", now - Duration::minutes(5 - i));
        }
        assert!(ledger.may_attempt_at("victim@x.com", None, now));

        fail(&ledger, "victim@x.com", "10.0.0.1", now);
        assert!(!ledger.may_attempt_at("victim@x.com", None, now));
        // Case and whitespace do not matter
        assert!(!ledger.may_attempt_at(" VICTIM@x.com", None, now));
        // Other emails are unaffected
        assert!(ledger.may_attempt_at("other@x.com", None, now));
    }

    #[test]
    fn test_retry_at_follows_the_ip_lock() {
        let (ledger, _) = ledger();
        let start = Utc::now();
        // Ten accounts, one failure each, all from the same address
        for i in 0..10 {
            fail(&ledger, &format!("user{}@x.com", i), "10.0.0.9", start + Duration::minutes(i));
        }
        let now = start + Duration::minutes(10);

        assert!(!ledger.may_attempt_at("fresh@x.com", Some("10.0.0.9"), now));
        assert!(ledger.lockout_info_at("fresh@x.com", now).can_retry_at.is_none());
        assert_eq!(
            ledger.retry_at_at("fresh@x.com", Some("10.0.0.9"), now),
            Some(start + Duration::minutes(9) + Duration::minutes(15))
        );
        assert_eq!(ledger.retry_at_at("fresh@x.com", Some("10.0.0.1"), now), None);
        assert_eq!(ledger.retry_at_at("fresh@x.com", None, now), None);
    }

    #[test]
    fn test_retry_at_takes_the_later_lock() {
        let (ledger, _) = ledger();
        let start = Utc::now();
        for i in 0..5 {
            fail(&ledger, "victim@x.com", "10.0.0.1", start + Duration::minutes(i));
        }
        for i in 0..10 {
            fail(&ledger, &format!("other{}@x.com", i), "10.0.0.1", start + Duration::minutes(5 + i));
        }
        let now = start + Duration::minutes(14);

        assert_eq!(
            ledger.retry_at_at("victim@x.com", None, now),
            Some(start + Duration::minutes(4 + 15))
        );
        assert_eq!(
            ledger.retry_at_at("victim@x.com", Some("10.0.0.1"), now),
            Some(start + Duration::minutes(14 + 15))
        );
    }

    #[test]
    fn test_lockout_expires_with_window() {
        let (ledger, _) = ledger();
        let start = Utc::now();
        for _ in 0..5 {
            fail(&ledger, "victim@x.com", "10.0.0.1", start);
        }

        let info = ledger.lockout_info_at("victim@x.com", start + Duration::minutes(1));
        assert!(info.is_locked);
        assert_eq!(info.failed_attempts, 5);
        assert_eq!(info.last_attempt_at, Some(start));
        assert_eq!(info.can_retry_at, Some(start + Duration::minutes(15)));

        let later = start + Duration::minutes(15);
        assert!(ledger.may_attempt_at("victim@x.com", None, later));
        let info = ledger.lockout_info_at("victim@x.com", later);
        assert!(!info.is_locked);
        assert_eq!(info.can_retry_at, None);
    }

    #[test]
    fn test_success_does_not_clear_prior_failures() {
        let (ledger, _) = ledger();
        let now = Utc::now();
        for _ in 0..4 {
            fail(&ledger, "victim@x.com", "10.0.0.1", now);
        }
        ledger.record_at("victim@x.com", true, Some("10.0.0.1"), None, None, now);
        assert!(ledger.may_attempt_at("victim@x.com", None, now));

        fail(&ledger, "victim@x.com", "10.0.0.1", now);
        assert!(!ledger.may_attempt_at("victim@x.com", None, now));
    }

    #[test]
    fn test_ip_threshold_is_twice_the_email_threshold() {
        let (ledger, _) = ledger();
        let now = Utc::now();
        for i in 0..9 {
            fail(&ledger, &format!("user{}@x.com", i), "10.0.0.9", now);
        }
        assert!(ledger.may_attempt_at("fresh@x.com", Some("10.0.0.9"), now));

        fail(&ledger, "user9@x.com", "10.0.0.9", now);
        assert!(!ledger.may_attempt_at("fresh@x.com", Some("10.0.0.9"), now));
        assert!(ledger.may_attempt_at("fresh@x.com", Some("10.0.0.10"), now));
        assert!(ledger.may_attempt_at("fresh@x.com", None, now));
    }

    #[test]
    fn test_entries_older_than_retention_are_pruned_on_write() {
        let (ledger, _) = ledger();
        let now = Utc::now();
        fail(&ledger, "a@x.com", "10.0.0.1", now - Duration::minutes(61));
        fail(&ledger, "b@x.com", "10.0.0.1", now);

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.attempts_since(now - Duration::hours(2))[0].email, "b@x.com");
    }

    #[test]
    fn test_prune_expired() {
        let (ledger, _) = ledger();
        let now = Utc::now();
        fail(&ledger, "a@x.com", "10.0.0.1", now);
        assert_eq!(ledger.prune_expired_at(now + Duration::minutes(30)), 0);
        assert_eq!(ledger.prune_expired_at(now + Duration::minutes(61)), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_record_emits_audit_events() {
        let (ledger, audit) = ledger();
        let now = Utc::now();
        for _ in 0..3 {
            fail(&ledger, "victim@x.com", "10.0.0.1", now);
        }

        let events = audit.snapshot();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| e.event_type == AuditEventType::Authentication));
        assert_eq!(events[0].action, "login_failure");
        assert!(!events[1].details.flags.multiple_failed_attempts);
        assert!(events[2].details.flags.multiple_failed_attempts);
        assert_eq!(events[2].risk_score, 65);
        assert_eq!(
            events[0].details.extra.get("failure_reason").map(|v| v.to_string()),
            Some("INVALID_PASSWORD".to_string())
        );
    }

    #[test]
    fn test_clear_lifts_lockout() {
        let (ledger, audit) = ledger();
        for _ in 0..5 {
            ledger.record("victim@x.com", false, None, None, Some(FailureReason::InvalidPassword));
        }
        assert!(ledger.is_locked("victim@x.com"));

        assert_eq!(ledger.clear("victim@x.com", None), 5);
        assert!(!ledger.is_locked("victim@x.com"));
        assert_eq!(audit.snapshot().last().unwrap().action, "lockout_cleared");
    }
}
