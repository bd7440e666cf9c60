//! Session lifecycle: create, validate, refresh, destroy and expiry sweeps.
//!
//! The map is keyed by bearer token and the token never changes for the life
//! of a session. The stored `expires_at` decides liveness; the token's
//! signature and session id must still match. `validate` and `refresh` mutate
//! through a per-entry guard, `destroy` takes ownership with `remove`.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditOutcome, Identity, NewAuditEvent, Session};
use crate::services::{metrics, AuditRecorder, TokenService};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub ttl: Duration,
    /// TTL for "remember me" sessions
    pub extended_ttl: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
            extended_ttl: Duration::days(30),
        }
    }
}

impl SessionSettings {
    pub fn ttl_for(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.extended_ttl
        } else {
            self.ttl
        }
    }
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    tokens: Arc<TokenService>,
    audit: Arc<AuditRecorder>,
    settings: SessionSettings,
}

impl SessionStore {
    pub fn new(
        settings: SessionSettings,
        tokens: Arc<TokenService>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            tokens,
            audit,
            settings,
        }
    }

    pub fn create(
        &self,
        identity: &Identity,
        remember_me: bool,
        origin_ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Session, anyhow::Error> {
        self.create_at(identity, remember_me, origin_ip, user_agent, Utc::now())
    }

    pub(crate) fn create_at(
        &self,
        identity: &Identity,
        remember_me: bool,
        origin_ip: Option<&str>,
        user_agent: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Session, anyhow::Error> {
        let ttl = self.settings.ttl_for(remember_me);
        let session_id = Uuid::new_v4().to_string();
        let token = self
            .tokens
            .issue_at(&identity.id, &session_id, identity.role, ttl, now)?;

        let session = Session {
            id: session_id,
            token: token.clone(),
            identity_id: identity.id.clone(),
            email: identity.email.clone(),
            role: identity.role,
            created_at: now,
            last_activity: now,
            expires_at: now + ttl,
            remember_me,
            origin_ip: origin_ip.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
        };
        self.sessions.insert(token, session.clone());
        metrics::set_active_sessions(self.sessions.len());

        tracing::info!(
            session_id = %session.id,
            identity_id = %session.identity_id,
            remember_me,
            expires_at = %session.expires_at,
            "Session created"
        );
        self.audit.log_at(
            NewAuditEvent::session("session_created", AuditOutcome::Success)
                .identity(Some(&session.identity_id), Some(&session.email))
                .session_id(&session.id)
                .origin(origin_ip, user_agent)
                .detail("remember_me", remember_me),
            now,
        );

        Ok(session)
    }

    /// Look up a live session and touch its `last_activity`. Expired or
    /// tampered entries are evicted.
    pub fn validate(&self, token: &str) -> Option<Session> {
        self.validate_at(token, Utc::now())
    }

    pub(crate) fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        {
            let mut entry = self.sessions.get_mut(token)?;
            if self.is_live(token, &entry, now) {
                entry.last_activity = now;
                return Some(entry.clone());
            }
        }

        // Guard released above; the entry is dead either way.
        self.evict(token);
        None
    }

    fn is_live(&self, token: &str, session: &Session, now: DateTime<Utc>) -> bool {
        !session.is_expired_at(now)
            && self
                .tokens
                .verify_signature(token)
                .is_some_and(|claims| claims.sid == session.id)
    }

    fn evict(&self, token: &str) {
        if let Some((_, session)) = self.sessions.remove(token) {
            metrics::set_active_sessions(self.sessions.len());
            tracing::debug!(
                session_id = %session.id,
                identity_id = %session.identity_id,
                "Evicted expired session"
            );
        }
    }

    /// Like `validate`, but also pushes `expires_at` one TTL window past
    /// `now`. The bearer token stays the same.
    pub fn refresh(&self, token: &str) -> Option<Session> {
        self.refresh_at(token, Utc::now())
    }

    pub(crate) fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        let refreshed = {
            let mut entry = self.sessions.get_mut(token)?;
            if self.is_live(token, &entry, now) {
                let ttl = self.settings.ttl_for(entry.remember_me);
                entry.last_activity = now;
                entry.expires_at = now + ttl;
                Some(entry.clone())
            } else {
                None
            }
        };

        let Some(session) = refreshed else {
            self.evict(token);
            return None;
        };

        tracing::debug!(
            session_id = %session.id,
            expires_at = %session.expires_at,
            "Session refreshed"
        );
        self.audit.log_at(
            NewAuditEvent::session("session_refreshed", AuditOutcome::Success)
                .identity(Some(&session.identity_id), Some(&session.email))
                .session_id(&session.id),
            now,
        );

        Some(session)
    }

    /// Remove a session. Returns whether one existed.
    pub fn destroy(&self, token: &str) -> bool {
        match self.sessions.remove(token) {
            Some((_, session)) => {
                metrics::set_active_sessions(self.sessions.len());
                tracing::info!(
                    session_id = %session.id,
                    identity_id = %session.identity_id,
                    "Session destroyed"
                );
                self.audit.log(
                    NewAuditEvent::session("session_destroyed", AuditOutcome::Success)
                        .identity(Some(&session.identity_id), Some(&session.email))
                        .session_id(&session.id),
                );
                true
            }
            None => false,
        }
    }

    /// Remove every session of `identity_id` except the one bearing
    /// `keep_token`.
    pub fn destroy_all_for(&self, identity_id: &str, keep_token: Option<&str>) -> usize {
        let mut removed = 0;
        self.sessions.retain(|token, session| {
            let revoke = session.identity_id == identity_id && Some(token.as_str()) != keep_token;
            if revoke {
                removed += 1;
            }
            !revoke
        });

        if removed > 0 {
            metrics::set_active_sessions(self.sessions.len());
            tracing::info!(identity_id = %identity_id, removed, "Revoked sessions for identity");
            self.audit.log(
                NewAuditEvent::session("sessions_revoked", AuditOutcome::Success)
                    .identity(Some(identity_id), None)
                    .detail("revoked", removed),
            );
        }
        removed
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        let after = self.sessions.len();
        metrics::set_active_sessions(after);
        before.saturating_sub(after)
    }

    pub fn active_sessions_for(&self, identity_id: &str) -> Vec<Session> {
        self.active_sessions_for_at(identity_id, Utc::now())
    }

    pub(crate) fn active_sessions_for_at(
        &self,
        identity_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|entry| entry.identity_id == identity_id && !entry.is_expired_at(now))
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
