//! Filtering, aggregation and pattern detection over the audit trail.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::models::{
    ActivityStatus, AuditCategory, AuditEvent, AuditEventType, AuditOutcome, AuditSeverity,
    SuspiciousActivity, SuspiciousActivityType,
};
use crate::services::AuditRecorder;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;
const TOP_N: usize = 10;

const BRUTE_FORCE_THRESHOLD: usize = 5;
const UNUSUAL_LOGIN_DISTINCT_IPS: usize = 3;

/// Conjunctive filter. An empty list places no constraint; inside one list
/// any value matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    pub event_types: Vec<AuditEventType>,
    pub categories: Vec<AuditCategory>,
    pub severities: Vec<AuditSeverity>,
    pub outcomes: Vec<AuditOutcome>,
    pub identity_ids: Vec<String>,
    pub identity_emails: Vec<String>,
    pub origin_ips: Vec<String>,
    pub tags: Vec<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub min_risk: Option<u8>,
    pub max_risk: Option<u8>,
    /// Case-insensitive text matched against action, emails, resource and
    /// detail entries
    pub search: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

fn any_or_empty<T: PartialEq>(list: &[T], value: &T) -> bool {
    list.is_empty() || list.contains(value)
}

fn any_opt_or_empty(list: &[String], value: Option<&str>) -> bool {
    list.is_empty() || value.is_some_and(|v| list.iter().any(|l| l.eq_ignore_ascii_case(v)))
}

impl AuditQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        if !any_or_empty(&self.event_types, &event.event_type)
            || !any_or_empty(&self.categories, &event.category)
            || !any_or_empty(&self.severities, &event.severity)
            || !any_or_empty(&self.outcomes, &event.outcome)
        {
            return false;
        }

        if !self.identity_ids.is_empty()
            && !event
                .identity_id
                .as_ref()
                .is_some_and(|id| self.identity_ids.contains(id))
        {
            return false;
        }
        if !any_opt_or_empty(&self.identity_emails, event.identity_email.as_deref())
            || !any_opt_or_empty(&self.origin_ips, event.origin_ip.as_deref())
        {
            return false;
        }
        if !self.tags.is_empty() && !event.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }

        if self.from.is_some_and(|from| event.timestamp < from)
            || self.to.is_some_and(|to| event.timestamp > to)
        {
            return false;
        }
        if self.min_risk.is_some_and(|min| event.risk_score < min)
            || self.max_risk.is_some_and(|max| event.risk_score > max)
        {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => text_matches(event, &term.to_lowercase()),
            _ => true,
        }
    }
}

fn text_matches(event: &AuditEvent, needle: &str) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(needle);

    hit(&event.action)
        || event.identity_email.as_deref().is_some_and(hit)
        || event.target_email.as_deref().is_some_and(hit)
        || event.resource.as_deref().is_some_and(hit)
        || event
            .details
            .extra
            .iter()
            .any(|(k, v)| hit(k) || hit(&v.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskBucket {
    pub range: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub total: usize,
    pub by_type: BTreeMap<AuditEventType, usize>,
    pub by_category: BTreeMap<AuditCategory, usize>,
    pub by_severity: BTreeMap<AuditSeverity, usize>,
    pub by_outcome: BTreeMap<AuditOutcome, usize>,
    pub top_identities: Vec<CountEntry>,
    pub top_origin_ips: Vec<CountEntry>,
    pub risk_distribution: Vec<RiskBucket>,
}

const RISK_BUCKETS: [(&str, u8, u8); 5] = [
    ("0-20", 0, 20),
    ("21-40", 21, 40),
    ("41-60", 41, 60),
    ("61-80", 61, 80),
    ("81-100", 81, 100),
];

fn top_n(counts: HashMap<String, usize>) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(key, count)| CountEntry { key, count })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(TOP_N);
    entries
}

pub struct AuditQueryEngine {
    audit: Arc<AuditRecorder>,
}

impl AuditQueryEngine {
    pub fn new(audit: Arc<AuditRecorder>) -> Self {
        Self { audit }
    }

    /// Matching events, newest first, paginated.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let mut events: Vec<AuditEvent> = self
            .audit
            .snapshot()
            .into_iter()
            .filter(|e| query.matches(e))
            .collect();

        events.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });

        events
            .into_iter()
            .skip(query.effective_offset())
            .take(query.effective_limit())
            .collect()
    }

    /// Number of matching events, ignoring pagination.
    pub fn count(&self, query: &AuditQuery) -> usize {
        self.audit
            .snapshot()
            .iter()
            .filter(|e| query.matches(e))
            .count()
    }

    pub fn summarize(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> AuditSummary {
        let events: Vec<AuditEvent> = self
            .audit
            .snapshot()
            .into_iter()
            .filter(|e| from.map_or(true, |f| e.timestamp >= f) && to.map_or(true, |t| e.timestamp <= t))
            .collect();

        let mut by_type = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        let mut by_outcome = BTreeMap::new();
        let mut identities: HashMap<String, usize> = HashMap::new();
        let mut ips: HashMap<String, usize> = HashMap::new();
        let mut buckets = [0usize; RISK_BUCKETS.len()];

        for event in &events {
            *by_type.entry(event.event_type).or_insert(0) += 1;
            *by_category.entry(event.category).or_insert(0) += 1;
            *by_severity.entry(event.severity).or_insert(0) += 1;
            *by_outcome.entry(event.outcome).or_insert(0) += 1;

            if let Some(actor) = event.actor_key() {
                *identities.entry(actor.to_string()).or_insert(0) += 1;
            }
            if let Some(ip) = &event.origin_ip {
                *ips.entry(ip.clone()).or_insert(0) += 1;
            }
            if let Some(idx) = RISK_BUCKETS
                .iter()
                .position(|(_, lo, hi)| (*lo..=*hi).contains(&event.risk_score))
            {
                buckets[idx] += 1;
            }
        }

        AuditSummary {
            total: events.len(),
            by_type,
            by_category,
            by_severity,
            by_outcome,
            top_identities: top_n(identities),
            top_origin_ips: top_n(ips),
            risk_distribution: RISK_BUCKETS
                .iter()
                .zip(buckets)
                .map(|((range, _, _), count)| RiskBucket { range, count })
                .collect(),
        }
    }

    /// Run the pattern heuristics over the recent trail, riskiest first.
    pub fn detect_suspicious(&self) -> Vec<SuspiciousActivity> {
        self.detect_suspicious_at(Utc::now())
    }

    pub(crate) fn detect_suspicious_at(&self, now: DateTime<Utc>) -> Vec<SuspiciousActivity> {
        let day = self.audit.events_since(now - Duration::hours(24));
        let hour_start = now - Duration::hours(1);

        let mut found = Vec::new();
        found.extend(brute_force(
            day.iter().filter(|e| e.timestamp >= hour_start),
            now,
        ));
        found.extend(privilege_escalation(day.iter(), now));
        found.extend(unusual_login_pattern(day.iter(), now));

        found.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));

        if !found.is_empty() {
            tracing::info!(count = found.len(), "Suspicious activity detected");
        }
        found
    }
}

fn group_by_actor<'a>(
    events: impl Iterator<Item = &'a AuditEvent>,
) -> BTreeMap<String, Vec<&'a AuditEvent>> {
    let mut groups: BTreeMap<String, Vec<&AuditEvent>> = BTreeMap::new();
    for event in events {
        if let Some(actor) = event.actor_key() {
            groups.entry(actor.to_string()).or_default().push(event);
        }
    }
    groups
}

fn activity(
    activity_type: SuspiciousActivityType,
    description: String,
    risk_score: usize,
    actor: String,
    events: &[&AuditEvent],
    now: DateTime<Utc>,
) -> SuspiciousActivity {
    SuspiciousActivity {
        activity_type,
        description,
        risk_score: risk_score.min(100) as u8,
        related_events: events.iter().map(|e| e.id.clone()).collect(),
        affected_identities: vec![actor],
        detected_at: now,
        status: ActivityStatus::Detected,
    }
}

fn brute_force<'a>(
    events: impl Iterator<Item = &'a AuditEvent>,
    now: DateTime<Utc>,
) -> Vec<SuspiciousActivity> {
    group_by_actor(events.filter(|e| {
        e.event_type == AuditEventType::Authentication && e.outcome == AuditOutcome::Failure
    }))
    .into_iter()
    .filter(|(_, group)| group.len() >= BRUTE_FORCE_THRESHOLD)
    .map(|(actor, group)| {
        activity(
            SuspiciousActivityType::BruteForce,
            format!("{} failed login attempts for {} in the last hour", group.len(), actor),
            10 * group.len(),
            actor,
            &group,
            now,
        )
    })
    .collect()
}

fn privilege_escalation<'a>(
    events: impl Iterator<Item = &'a AuditEvent>,
    now: DateTime<Utc>,
) -> Vec<SuspiciousActivity> {
    group_by_actor(events.filter(|e| {
        e.event_type == AuditEventType::Authorization && e.details.flags.privilege_escalation
    }))
    .into_iter()
    .map(|(actor, group)| {
        activity(
            SuspiciousActivityType::PrivilegeEscalation,
            format!("{} privilege escalation attempts by {}", group.len(), actor),
            40 + 20 * group.len(),
            actor,
            &group,
            now,
        )
    })
    .collect()
}

fn unusual_login_pattern<'a>(
    events: impl Iterator<Item = &'a AuditEvent>,
    now: DateTime<Utc>,
) -> Vec<SuspiciousActivity> {
    group_by_actor(events.filter(|e| {
        e.event_type == AuditEventType::Authentication && e.outcome == AuditOutcome::Success
    }))
    .into_iter()
    .filter_map(|(actor, group)| {
        let ips: BTreeSet<&str> = group.iter().filter_map(|e| e.origin_ip.as_deref()).collect();
        (ips.len() >= UNUSUAL_LOGIN_DISTINCT_IPS).then(|| {
            activity(
                SuspiciousActivityType::UnusualLoginPattern,
                format!(
                    "Successful logins for {} from {} different IP addresses",
                    actor,
                    ips.len()
                ),
                20 * ips.len(),
                actor,
                &group,
                now,
            )
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAuditEvent, RiskFlags};
    use crate::services::AuditSettings;

    fn engine() -> (AuditQueryEngine, Arc<AuditRecorder>) {
        let audit = Arc::new(AuditRecorder::new(AuditSettings::default()));
        (AuditQueryEngine::new(audit.clone()), audit)
    }

    fn failed_login(email: &str, ip: &str) -> NewAuditEvent {
        NewAuditEvent::authentication("login_failure", AuditOutcome::Failure)
            .identity(None, Some(email))
            .origin(Some(ip), None)
            .resource("auth/login")
            .detail("failure_reason", "INVALID_PASSWORD")
    }

    fn successful_login(email: &str, ip: &str) -> NewAuditEvent {
        NewAuditEvent::authentication("login_success", AuditOutcome::Success)
            .identity(None, Some(email))
            .origin(Some(ip), None)
    }

    #[test]
    fn test_query_filters_are_conjunctive() {
        let (engine, audit) = engine();
        audit.log(failed_login("a@x.com", "10.0.0.1"));
        audit.log(failed_login("b@x.com", "10.0.0.2"));
        audit.log(successful_login("a@x.com", "10.0.0.1"));

        let query = AuditQuery {
            outcomes: vec![AuditOutcome::Failure],
            identity_emails: vec!["a@x.com".to_string()],
            ..AuditQuery::default()
        };
        let events = engine.query(&query);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "login_failure");
        assert_eq!(engine.count(&query), 1);

        // Within one list any value matches
        let query = AuditQuery {
            identity_emails: vec!["a@x.com".to_string(), "b@x.com".to_string()],
            outcomes: vec![AuditOutcome::Failure],
            ..AuditQuery::default()
        };
        assert_eq!(engine.count(&query), 2);
    }

    #[test]
    fn test_query_orders_newest_first_and_paginates() {
        let (engine, audit) = engine();
        let now = Utc::now();
        for i in 0..5 {
            audit.log_at(
                successful_login(&format!("u{}@x.com", i), "10.0.0.1"),
                now - Duration::minutes(10 - i),
            );
        }
        // Same timestamp as the newest, ordered by sequence
        audit.log_at(successful_login("tie@x.com", "10.0.0.1"), now - Duration::minutes(6));

        let all = engine.query(&AuditQuery::default());
        let emails: Vec<&str> = all
            .iter()
            .map(|e| e.identity_email.as_deref().unwrap())
            .collect();
        assert_eq!(
            emails,
            vec!["tie@x.com", "u4@x.com", "u3@x.com", "u2@x.com", "u1@x.com", "u0@x.com"]
        );

        let page = engine.query(&AuditQuery {
            offset: Some(2),
            limit: Some(2),
            ..AuditQuery::default()
        });
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].identity_email.as_deref(), Some("u3@x.com"));
    }

    #[test]
    fn test_limit_defaults_and_cap() {
        assert_eq!(AuditQuery::default().effective_limit(), DEFAULT_LIMIT);
        let huge = AuditQuery {
            limit: Some(50_000),
            ..AuditQuery::default()
        };
        assert_eq!(huge.effective_limit(), MAX_LIMIT);
    }

    #[test]
    fn test_search_and_risk_range() {
        let (engine, audit) = engine();
        audit.log(failed_login("a@x.com", "10.0.0.1"));
        audit.log(NewAuditEvent::security_violation("tampered_token").resource("auth/session"));

        let by_detail = engine.query(&AuditQuery {
            search: Some("invalid_password".to_string()),
            ..AuditQuery::default()
        });
        assert_eq!(by_detail.len(), 1);

        let by_resource = engine.query(&AuditQuery {
            search: Some("AUTH/SESSION".to_string()),
            ..AuditQuery::default()
        });
        assert_eq!(by_resource[0].action, "tampered_token");

        // SECURITY_VIOLATION, HIGH, FAILURE: 80 * 2.0 * 1.5 clamps to 100
        let risky = engine.query(&AuditQuery {
            min_risk: Some(90),
            max_risk: Some(100),
            ..AuditQuery::default()
        });
        assert_eq!(risky.len(), 1);
        assert_eq!(risky[0].risk_score, 100);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let (engine, audit) = engine();
        let at = Utc::now() - Duration::hours(2);
        audit.log_at(successful_login("a@x.com", "10.0.0.1"), at);

        let query = AuditQuery {
            from: Some(at),
            to: Some(at),
            ..AuditQuery::default()
        };
        assert_eq!(engine.count(&query), 1);
    }

    #[test]
    fn test_summary() {
        let (engine, audit) = engine();
        for _ in 0..3 {
            audit.log(failed_login("a@x.com", "10.0.0.1"));
        }
        audit.log(successful_login("b@x.com", "10.0.0.2"));
        audit.log(NewAuditEvent::security_violation("tampered_token"));

        let summary = engine.summarize(None, None);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.by_type[&AuditEventType::Authentication], 4);
        assert_eq!(summary.by_outcome[&AuditOutcome::Failure], 4);
        assert_eq!(
            summary.top_identities[0],
            CountEntry {
                key: "a@x.com".to_string(),
                count: 3
            }
        );
        assert_eq!(summary.top_origin_ips[0].key, "10.0.0.1");

        let histogram: Vec<usize> = summary.risk_distribution.iter().map(|b| b.count).collect();
        // logins score 45 and 10, the violation 100
        assert_eq!(histogram, vec![1, 0, 3, 0, 1]);
    }

    #[test]
    fn test_detects_brute_force() {
        let (engine, audit) = engine();
        let now = Utc::now();
        for i in 0..5 {
            audit.log_at(
                failed_login("victim@x.com", "203.0.113.7"),
                now - Duration::minutes(50 - i),
            );
        }
        // Outside the hour
        audit.log_at(
            failed_login("old@x.com", "203.0.113.7"),
            now - Duration::minutes(70),
        );

        let found = engine.detect_suspicious_at(now);
        assert_eq!(found.len(), 1);
        let activity = &found[0];
        assert_eq!(activity.activity_type, SuspiciousActivityType::BruteForce);
        assert_eq!(activity.risk_score, 50);
        assert_eq!(activity.affected_identities, vec!["victim@x.com"]);
        assert_eq!(activity.related_events.len(), 5);
        assert_eq!(activity.status, ActivityStatus::Detected);
    }

    #[test]
    fn test_four_failures_are_not_brute_force() {
        let (engine, audit) = engine();
        for _ in 0..4 {
            audit.log(failed_login("victim@x.com", "203.0.113.7"));
        }
        assert!(engine.detect_suspicious().is_empty());
    }

    #[test]
    fn test_detects_privilege_escalation_and_sorts_by_risk() {
        let (engine, audit) = engine();
        for _ in 0..2 {
            audit.log(
                NewAuditEvent::authorization("permission_denied", AuditOutcome::Failure)
                    .identity(Some("id-9"), Some("member@x.com"))
                    .flags(RiskFlags {
                        privilege_escalation: true,
                        ..RiskFlags::default()
                    }),
            );
        }
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            audit.log(successful_login("roamer@x.com", ip));
        }

        let found = engine.detect_suspicious();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].activity_type, SuspiciousActivityType::PrivilegeEscalation);
        assert_eq!(found[0].risk_score, 80);
        assert_eq!(found[1].activity_type, SuspiciousActivityType::UnusualLoginPattern);
        assert_eq!(found[1].risk_score, 60);
        assert_eq!(found[1].affected_identities, vec!["roamer@x.com"]);
    }
}
