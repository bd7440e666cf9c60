//! In-memory audit trail.
//!
//! Events live in a bounded ring ordered by insertion. The oldest entries are
//! dropped once the buffer exceeds its capacity or falls outside the
//! retention horizon.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditEvent, NewAuditEvent};
use crate::services::metrics;

/// Hook invoked for events at or above the alert threshold.
pub trait AlertSink: Send + Sync {
    fn high_risk(&self, event: &AuditEvent);
}

/// Default sink: a structured warning on the `security_alert` target.
#[derive(Debug, Default, Clone)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn high_risk(&self, event: &AuditEvent) {
        tracing::warn!(
            target: "security_alert",
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            action = %event.action,
            risk_score = event.risk_score,
            identity_email = event.identity_email.as_deref().unwrap_or("-"),
            origin_ip = event.origin_ip.as_deref().unwrap_or("-"),
            "High risk security event"
        );
    }
}

#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub capacity: usize,
    pub retention: Duration,
    pub alert_threshold: u8,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            retention: Duration::days(90),
            alert_threshold: 70,
        }
    }
}

pub struct AuditRecorder {
    events: RwLock<VecDeque<AuditEvent>>,
    sequence: AtomicU64,
    settings: AuditSettings,
    sink: Arc<dyn AlertSink>,
}

impl AuditRecorder {
    pub fn new(settings: AuditSettings) -> Self {
        Self::with_sink(settings, Arc::new(TracingAlertSink))
    }

    pub fn with_sink(settings: AuditSettings, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            sequence: AtomicU64::new(0),
            settings,
            sink,
        }
    }

    pub fn settings(&self) -> &AuditSettings {
        &self.settings
    }

    /// Record an event, stamping id, sequence, timestamp and risk score.
    pub fn log(&self, event: NewAuditEvent) -> AuditEvent {
        self.log_at(event, Utc::now())
    }

    pub(crate) fn log_at(&self, event: NewAuditEvent, now: DateTime<Utc>) -> AuditEvent {
        let recorded = {
            let mut events = self.events.write();
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let recorded = AuditEvent::from_new(Uuid::new_v4().to_string(), sequence, event, now);
            events.push_back(recorded.clone());

            let horizon = now - self.settings.retention;
            while events
                .front()
                .is_some_and(|oldest| oldest.timestamp < horizon)
            {
                events.pop_front();
            }
            while events.len() > self.settings.capacity {
                events.pop_front();
            }
            recorded
        };

        tracing::debug!(
            event_id = %recorded.id,
            event_type = recorded.event_type.as_str(),
            action = %recorded.action,
            outcome = recorded.outcome.as_str(),
            risk_score = recorded.risk_score,
            "Audit event recorded"
        );

        if recorded.risk_score >= self.settings.alert_threshold {
            metrics::record_high_risk_event();
            self.sink.high_risk(&recorded);
        }

        recorded
    }

    /// Drop events older than the retention horizon.
    pub fn sweep_retention(&self) -> usize {
        self.sweep_retention_at(Utc::now())
    }

    pub(crate) fn sweep_retention_at(&self, now: DateTime<Utc>) -> usize {
        let horizon = now - self.settings.retention;
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|event| event.timestamp >= horizon);
        before - events.len()
    }

    /// Copy of every retained event in insertion order.
    pub fn snapshot(&self) -> Vec<AuditEvent> {
        self.events.read().iter().cloned().collect()
    }

    /// Events at or after `cutoff`, in insertion order.
    pub fn events_since(&self, cutoff: DateTime<Utc>) -> Vec<AuditEvent> {
        self.events
            .read()
            .iter()
            .filter(|event| event.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
