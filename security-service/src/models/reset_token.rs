use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Single-use password reset token. Only the SHA-256 of the raw token is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetToken {
    pub id: String,
    pub identity_id: String,
    pub email: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    /// Terminal once set
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl ResetToken {
    pub fn new(
        identity_id: String,
        email: String,
        token: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identity_id,
            email,
            token_hash: Self::hash_token(token),
            expires_at: now + ttl,
            used: false,
            created_at: now,
        }
    }

    /// Hash a token using SHA-256
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired_at(now)
    }
}
