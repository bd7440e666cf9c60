use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

/// Claims carried by a session bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (identity ID)
    pub sub: String,
    /// Session ID
    pub sid: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Initial expiration time (Unix timestamp). A refreshed session outlives it.
    pub exp: i64,
    /// Unique per issued token
    pub jti: String,
}

/// Result of [`TokenService::verify`]. Never an error: anything wrong with
/// the token just yields `valid = false`.
#[derive(Debug, Clone)]
pub struct TokenVerification {
    pub valid: bool,
    pub claims: Option<TokenClaims>,
}

impl TokenVerification {
    fn invalid() -> Self {
        Self {
            valid: false,
            claims: None,
        }
    }
}

/// HS256 signer for session tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    signature_only: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        // Session liveness is decided by the store, which may extend a
        // session past the `exp` it was signed with.
        let mut signature_only = validation.clone();
        signature_only.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            signature_only,
        }
    }

    /// Sign a token for `identity_id`/`session_id` that expires after `ttl`.
    pub fn issue(
        &self,
        identity_id: &str,
        session_id: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<String, anyhow::Error> {
        self.issue_at(identity_id, session_id, role, ttl, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        identity_id: &str,
        session_id: &str,
        role: Role,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, anyhow::Error> {
        let claims = TokenClaims {
            sub: identity_id.to_string(),
            sid: session_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode session token: {}", e))
    }

    pub fn verify(&self, token: &str) -> TokenVerification {
        match decode::<TokenClaims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => TokenVerification {
                valid: true,
                claims: Some(data.claims),
            },
            Err(e) => {
                tracing::debug!(error = %e, "Session token rejected");
                TokenVerification::invalid()
            }
        }
    }

    /// Claims of a token signed by this service, ignoring `exp`.
    pub fn verify_signature(&self, token: &str) -> Option<TokenClaims> {
        match decode::<TokenClaims>(token, &self.decoding_key, &self.signature_only) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "Session token signature rejected");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::new("test-secret");
        let token = service
            .issue("identity-1", "session-1", Role::Pastor, Duration::hours(1))
            .unwrap();

        let result = service.verify(&token);
        assert!(result.valid);
        let claims = result.claims.unwrap();
        assert_eq!(claims.sub, "identity-1");
        assert_eq!(claims.sid, "session-1");
        assert_eq!(claims.role, Role::Pastor);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let service = TokenService::new("test-secret");
        let token = service
            .issue_at(
                "identity-1",
                "session-1",
                Role::Membro,
                Duration::hours(1),
                Utc::now() - Duration::hours(2),
            )
            .unwrap();

        let result = service.verify(&token);
        assert!(!result.valid);
        assert!(result.claims.is_none());
    }

    #[test]
    fn test_wrong_secret_and_garbage_fail_closed() {
        let issuer = TokenService::new("secret-a");
        let verifier = TokenService::new("secret-b");
        let token = issuer
            .issue("identity-1", "session-1", Role::Admin, Duration::hours(1))
            .unwrap();

        assert!(!verifier.verify(&token).valid);
        assert!(!verifier.verify("not.a.token").valid);
        assert!(!verifier.verify("").valid);
    }

    #[test]
    fn test_signature_check_ignores_exp() {
        let service = TokenService::new("test-secret");
        let token = service
            .issue_at(
                "identity-1",
                "session-1",
                Role::Membro,
                Duration::hours(1),
                Utc::now() - Duration::hours(2),
            )
            .unwrap();

        assert!(!service.verify(&token).valid);
        assert_eq!(service.verify_signature(&token).unwrap().sid, "session-1");
        assert!(TokenService::new("other").verify_signature(&token).is_none());
    }

    #[test]
    fn test_tokens_are_unique() {
        let service = TokenService::new("test-secret");
        let a = service
            .issue("identity-1", "session-1", Role::Membro, Duration::hours(1))
            .unwrap();
        let b = service
            .issue("identity-1", "session-1", Role::Membro, Duration::hours(1))
            .unwrap();
        assert_ne!(a, b);
    }
}
