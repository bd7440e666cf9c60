//! Periodic scan of the login attempt ledger for operator alerts.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AlertType, AuditSeverity, LoginAttempt, SecurityAlert};
use crate::services::LoginAttemptLedger;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub window: Duration,
    /// Attempts from one IP inside the window that raise RAPID_ATTEMPTS
    pub rapid_attempts: usize,
    /// Distinct IPs for one email that raise MULTIPLE_IPS
    pub distinct_ips: usize,
    /// Local hour range `[start, end)`; wraps past midnight when start > end
    pub unusual_hours_start: u32,
    pub unusual_hours_end: u32,
    pub utc_offset_hours: i32,
    pub history_limit: usize,
    pub dedupe_window: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            window: Duration::hours(1),
            rapid_attempts: 10,
            distinct_ips: 3,
            unusual_hours_start: 2,
            unusual_hours_end: 6,
            utc_offset_hours: 0,
            history_limit: 500,
            dedupe_window: Duration::hours(1),
        }
    }
}

impl MonitorSettings {
    fn is_unusual_hour(&self, hour: u32) -> bool {
        let (start, end) = (self.unusual_hours_start, self.unusual_hours_end);
        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }

    fn local_hour(&self, at: DateTime<Utc>) -> u32 {
        match FixedOffset::east_opt(self.utc_offset_hours * 3600) {
            Some(offset) => at.with_timezone(&offset).hour(),
            None => at.hour(),
        }
    }
}

#[derive(Default)]
struct MonitorState {
    history: VecDeque<SecurityAlert>,
    last_raised: HashMap<(AlertType, String), DateTime<Utc>>,
}

pub struct SecurityMonitor {
    ledger: Arc<LoginAttemptLedger>,
    settings: MonitorSettings,
    state: Mutex<MonitorState>,
}

struct Candidate {
    alert_type: AlertType,
    severity: AuditSeverity,
    subject: String,
    message: String,
    email: Option<String>,
    origin_ip: Option<String>,
    attempt_count: usize,
}

impl SecurityMonitor {
    pub fn new(ledger: Arc<LoginAttemptLedger>, settings: MonitorSettings) -> Self {
        Self {
            ledger,
            settings,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Evaluate the recent ledger and return the alerts raised by this pass.
    /// An alert for the same type and subject is not raised twice inside the
    /// dedupe window.
    pub fn scan(&self) -> Vec<SecurityAlert> {
        self.scan_at(Utc::now())
    }

    pub(crate) fn scan_at(&self, now: DateTime<Utc>) -> Vec<SecurityAlert> {
        let attempts = self.ledger.attempts_since(now - self.settings.window);

        let mut candidates = self.rapid_attempts(&attempts);
        candidates.extend(self.multiple_ips(&attempts));
        candidates.extend(self.unusual_hours(&attempts));

        let mut state = self.state.lock();
        let dedupe_start = now - self.settings.dedupe_window;
        state.last_raised.retain(|_, at| *at > dedupe_start);

        let mut raised = Vec::new();
        for candidate in candidates {
            let key = (candidate.alert_type, candidate.subject);
            if state.last_raised.contains_key(&key) {
                continue;
            }

            let alert = SecurityAlert {
                id: Uuid::new_v4().to_string(),
                alert_type: candidate.alert_type,
                severity: candidate.severity,
                message: candidate.message,
                email: candidate.email,
                origin_ip: candidate.origin_ip,
                attempt_count: candidate.attempt_count,
                created_at: now,
            };
            tracing::warn!(
                target: "security_alert",
                alert_type = alert.alert_type.as_str(),
                severity = alert.severity.as_str(),
                email = alert.email.as_deref().unwrap_or("-"),
                origin_ip = alert.origin_ip.as_deref().unwrap_or("-"),
                attempt_count = alert.attempt_count,
                "{}",
                alert.message
            );

            state.last_raised.insert(key, now);
            state.history.push_back(alert.clone());
            raised.push(alert);
        }

        while state.history.len() > self.settings.history_limit {
            state.history.pop_front();
        }

        raised
    }

    /// Most recent alerts first.
    pub fn recent_alerts(&self, limit: usize) -> Vec<SecurityAlert> {
        self.state
            .lock()
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    fn rapid_attempts(&self, attempts: &[LoginAttempt]) -> Vec<Candidate> {
        let mut by_ip: BTreeMap<&str, usize> = BTreeMap::new();
        for attempt in attempts {
            if let Some(ip) = attempt.origin_ip.as_deref() {
                *by_ip.entry(ip).or_insert(0) += 1;
            }
        }

        by_ip
            .into_iter()
            .filter(|(_, count)| *count >= self.settings.rapid_attempts)
            .map(|(ip, count)| Candidate {
                alert_type: AlertType::RapidAttempts,
                severity: AuditSeverity::High,
                subject: ip.to_string(),
                message: format!("{} login attempts from {} within the last hour", count, ip),
                email: None,
                origin_ip: Some(ip.to_string()),
                attempt_count: count,
            })
            .collect()
    }

    fn multiple_ips(&self, attempts: &[LoginAttempt]) -> Vec<Candidate> {
        let mut by_email: BTreeMap<&str, (BTreeSet<&str>, usize)> = BTreeMap::new();
        for attempt in attempts {
            let entry = by_email.entry(attempt.email.as_str()).or_default();
            entry.1 += 1;
            if let Some(ip) = attempt.origin_ip.as_deref() {
                entry.0.insert(ip);
            }
        }

        by_email
            .into_iter()
            .filter(|(_, (ips, _))| ips.len() >= self.settings.distinct_ips)
            .map(|(email, (ips, count))| Candidate {
                alert_type: AlertType::MultipleIps,
                severity: AuditSeverity::Medium,
                subject: email.to_string(),
                message: format!(
                    "Login attempts for {} from {} different IP addresses",
                    email,
                    ips.len()
                ),
                email: Some(email.to_string()),
                origin_ip: None,
                attempt_count: count,
            })
            .collect()
    }

    fn unusual_hours(&self, attempts: &[LoginAttempt]) -> Vec<Candidate> {
        let mut by_email: BTreeMap<&str, usize> = BTreeMap::new();
        for attempt in attempts {
            if self
                .settings
                .is_unusual_hour(self.settings.local_hour(attempt.timestamp))
            {
                *by_email.entry(attempt.email.as_str()).or_insert(0) += 1;
            }
        }

        by_email
            .into_iter()
            .map(|(email, count)| Candidate {
                alert_type: AlertType::UnusualHours,
                severity: AuditSeverity::Low,
                subject: email.to_string(),
                message: format!(
                    "{} login attempts for {} between {:02}:00 and {:02}:00",
                    count, email, self.settings.unusual_hours_start, self.settings.unusual_hours_end
                ),
                email: Some(email.to_string()),
                origin_ip: None,
                attempt_count: count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureReason;
    use crate::services::{AuditRecorder, AuditSettings, LedgerSettings};
    use chrono::TimeZone;

    fn setup(settings: MonitorSettings) -> (SecurityMonitor, Arc<LoginAttemptLedger>) {
        let audit = Arc::new(AuditRecorder::new(AuditSettings::default()));
        let ledger = Arc::new(LoginAttemptLedger::new(LedgerSettings::default(), audit));
        (SecurityMonitor::new(ledger.clone(), settings), ledger)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
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
    fn test_rapid_attempts_from_one_ip() {
        let (monitor, ledger) = setup(MonitorSettings::default());
        let now = noon();
        for i in 0..10 {
            fail(&ledger, &format!("user{}@x.com", i), "198.51.100.4", now - Duration::minutes(i));
        }

        let alerts = monitor.scan_at(now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::RapidAttempts);
        assert_eq!(alerts[0].origin_ip.as_deref(), Some("198.51.100.4"));
        assert_eq!(alerts[0].attempt_count, 10);
        assert_eq!(alerts[0].severity, AuditSeverity::High);
    }

    #[test]
    fn test_multiple_ips_for_one_email() {
        let (monitor, ledger) = setup(MonitorSettings::default());
        let now = noon();
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            fail(&ledger, "target@x.com", ip, now - Duration::minutes(5));
        }

        let alerts = monitor.scan_at(now);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::MultipleIps);
        assert_eq!(alerts[0].email.as_deref(), Some("target@x.com"));
    }

    #[test]
    fn test_alerts_are_deduplicated_within_an_hour() {
        let (monitor, ledger) = setup(MonitorSettings::default());
        let now = noon();
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            fail(&ledger, "target@x.com", ip, now);
        }

        assert_eq!(monitor.scan_at(now).len(), 1);
        assert!(monitor.scan_at(now + Duration::minutes(5)).is_empty());

        for ip in ["10.0.0.4", "10.0.0.5", "10.0.0.6"] {
            fail(&ledger, "target@x.com", ip, now + Duration::minutes(61));
        }
        assert_eq!(monitor.scan_at(now + Duration::minutes(61)).len(), 1);
        assert_eq!(monitor.recent_alerts(10).len(), 2);
    }

    #[test]
    fn test_unusual_hours_with_offset() {
        // 05:30 UTC is 02:30 at UTC-3
        let settings = MonitorSettings {
            utc_offset_hours: -3,
            ..MonitorSettings::default()
        };
        let (monitor, ledger) = setup(settings);
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 5, 30, 0).unwrap();
        ledger.record_at("night@x.com", true, Some("10.0.0.1"), None, None, at);

        let alerts = monitor.scan_at(at + Duration::minutes(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::UnusualHours);

        // Same instant is 05:30 in UTC, still inside [2, 6)
        let (utc_monitor, utc_ledger) = setup(MonitorSettings::default());
        utc_ledger.record_at("night@x.com", true, Some("10.0.0.1"), None, None, at);
        assert_eq!(utc_monitor.scan_at(at).len(), 1);

        // 08:30 at UTC+3 is outside
        let (east, east_ledger) = setup(MonitorSettings {
            utc_offset_hours: 3,
            ..MonitorSettings::default()
        });
        east_ledger.record_at("night@x.com", true, Some("10.0.0.1"), None, None, at);
        assert!(east.scan_at(at).is_empty());
    }

    #[test]
    fn test_unusual_hours_wrap_past_midnight() {
        let settings = MonitorSettings {
            unusual_hours_start: 22,
            unusual_hours_end: 4,
            ..MonitorSettings::default()
        };
        assert!(settings.is_unusual_hour(23));
        assert!(settings.is_unusual_hour(0));
        assert!(settings.is_unusual_hour(3));
        assert!(!settings.is_unusual_hour(4));
        assert!(!settings.is_unusual_hour(12));
    }

    #[test]
    fn test_history_is_bounded_and_newest_first() {
        let (monitor, ledger) = setup(MonitorSettings {
            history_limit: 2,
            ..MonitorSettings::default()
        });
        let now = noon();
        for n in 0..3 {
            for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
                fail(&ledger, &format!("t{}@x.com", n), ip, now);
            }
        }

        assert_eq!(monitor.scan_at(now).len(), 3);
        let recent = monitor.recent_alerts(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].email.as_deref(), Some("t2@x.com"));
        assert_eq!(recent[1].email.as_deref(), Some("t1@x.com"));
    }
}
