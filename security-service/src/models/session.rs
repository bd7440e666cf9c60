use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::Role;

/// Server-held record binding a bearer token to an identity.
#[derive(Clone)]
pub struct Session {
    pub id: String,
    pub token: String,
    pub identity_id: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remember_me: bool,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity_id", &self.identity_id)
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .field("remember_me", &self.remember_me)
            .finish_non_exhaustive()
    }
}

/// Session as shown to API clients: everything except the bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub identity_id: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub remember_me: bool,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            identity_id: session.identity_id.clone(),
            email: session.email.clone(),
            role: session.role,
            created_at: session.created_at,
            last_activity: session.last_activity,
            expires_at: session.expires_at,
            remember_me: session.remember_me,
            origin_ip: session.origin_ip.clone(),
            user_agent: session.user_agent.clone(),
        }
    }
}
