//! Email-based password reset with single-use tokens.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{normalize_email, AuditOutcome, NewAuditEvent, ResetToken};
use crate::services::{AuditRecorder, IdentityDirectory, Mailer, PolicyService, SessionStore};
use crate::utils::password::{hash_password_blocking, Password};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct ResetSettings {
    pub ttl: Duration,
    /// Frontend origin the emailed link points at
    pub base_url: String,
}

impl Default for ResetSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

pub struct PasswordResetService {
    /// Keyed by token hash
    tokens: Mutex<HashMap<String, ResetToken>>,
    directory: Arc<dyn IdentityDirectory>,
    mailer: Arc<dyn Mailer>,
    sessions: Arc<SessionStore>,
    audit: Arc<AuditRecorder>,
    settings: ResetSettings,
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl PasswordResetService {
    pub fn new(
        settings: ResetSettings,
        directory: Arc<dyn IdentityDirectory>,
        mailer: Arc<dyn Mailer>,
        sessions: Arc<SessionStore>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            directory,
            mailer,
            sessions,
            audit,
            settings,
        }
    }

    /// Issue a reset token for `email` and mail the link.
    ///
    /// Unknown and inactive accounts yield `Ok(None)`; callers must answer
    /// the same way in both cases. The mail goes out on a detached task so
    /// response time does not depend on whether the account exists.
    pub async fn request_reset(
        &self,
        email: &str,
        origin_ip: Option<&str>,
    ) -> Result<Option<String>, anyhow::Error> {
        self.request_reset_at(email, origin_ip, Utc::now()).await
    }

    pub(crate) async fn request_reset_at(
        &self,
        email: &str,
        origin_ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, anyhow::Error> {
        let email = normalize_email(email);

        let identity = match self.directory.find_by_email(&email).await? {
            Some(identity) if identity.active => identity,
            _ => {
                tracing::info!(email = %email, "Password reset requested for unknown or inactive account");
                return Ok(None);
            }
        };

        let token = generate_token();
        let record = ResetToken::new(
            identity.id.clone(),
            identity.email.clone(),
            &token,
            self.settings.ttl,
            now,
        );

        let replaced = {
            let mut tokens = self.tokens.lock();
            let before = tokens.len();
            tokens.retain(|_, t| t.used || t.identity_id != identity.id);
            let replaced = before - tokens.len();
            tokens.insert(record.token_hash.clone(), record.clone());
            replaced
        };

        self.audit.log_at(
            NewAuditEvent::password("password_reset_requested", AuditOutcome::Success)
                .identity(Some(&identity.id), Some(&identity.email))
                .origin(origin_ip, None)
                .detail("replaced_tokens", replaced),
            now,
        );

        let link = format!(
            "{}/reset-password?token={}",
            self.settings.base_url.trim_end_matches('/'),
            token
        );
        let text = format!(
            "Hello {},\n\nA password reset was requested for your account. \
             Use the link below to choose a new password:\n\n{}\n\n\
             The link expires at {}. If you did not request this, ignore this email.",
            identity.display_name,
            link,
            record.expires_at.format("%Y-%m-%d %H:%M UTC"),
        );
        let html = format!(
            "<p>Hello {},</p><p>A password reset was requested for your account.</p>\
             <p><a href=\"{}\">Choose a new password</a></p>\
             <p>The link expires at {}. If you did not request this, ignore this email.</p>",
            escape_html(&identity.display_name),
            link,
            record.expires_at.format("%Y-%m-%d %H:%M UTC"),
        );

        let mailer = self.mailer.clone();
        let to = identity.email.clone();
        let identity_id = identity.id.clone();
        tokio::spawn(async move {
            if !mailer.send(&to, "Password reset", &text, Some(&html)).await {
                tracing::warn!(
                    identity_id = %identity_id,
                    "Password reset email was not delivered, token remains valid"
                );
            }
        });

        tracing::info!(identity_id = %identity.id, token_id = %record.id, "Password reset token issued");
        Ok(Some(token))
    }

    /// The stored record for a usable token.
    pub fn validate(&self, token: &str) -> Option<ResetToken> {
        self.validate_at(token, Utc::now())
    }

    pub(crate) fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<ResetToken> {
        let hash = ResetToken::hash_token(token);
        self.tokens
            .lock()
            .get(&hash)
            .filter(|t| t.is_usable_at(now))
            .cloned()
    }

    /// Set a new password through a reset token. Returns whether the password
    /// was changed.
    pub async fn consume(&self, token: &str, new_password: &Password) -> bool {
        self.consume_at(token, new_password, Utc::now()).await
    }

    pub(crate) async fn consume_at(
        &self,
        token: &str,
        new_password: &Password,
        now: DateTime<Utc>,
    ) -> bool {
        if self.validate_at(token, now).is_none() {
            return false;
        }

        let report = PolicyService::validate_password(new_password.as_str());
        if !report.valid {
            tracing::info!(violations = report.violations.len(), "Reset password rejected by policy");
            return false;
        }

        let hash = match hash_password_blocking(new_password.clone()).await {
            Ok(hash) => hash,
            Err(e) => {
                tracing::error!(error = %e, "Failed to hash reset password");
                return false;
            }
        };

        // Claim under the lock; only one consumer can flip `used`.
        let claimed = {
            let mut tokens = self.tokens.lock();
            match tokens.get_mut(&ResetToken::hash_token(token)) {
                Some(record) if record.is_usable_at(now) => {
                    record.used = true;
                    Some(record.clone())
                }
                _ => None,
            }
        };
        let Some(record) = claimed else {
            return false;
        };

        if let Err(e) = self
            .directory
            .update_credential(&record.identity_id, hash)
            .await
        {
            tracing::error!(
                error = ?e,
                identity_id = %record.identity_id,
                "Failed to store password from reset"
            );
            self.audit.log_at(
                NewAuditEvent::password("password_reset_completed", AuditOutcome::Failure)
                    .identity(Some(&record.identity_id), Some(&record.email))
                    .detail("reason", "system_error"),
                now,
            );
            return false;
        }

        let revoked = self.sessions.destroy_all_for(&record.identity_id, None);

        tracing::info!(identity_id = %record.identity_id, revoked, "Password reset completed");
        self.audit.log_at(
            NewAuditEvent::password("password_reset_completed", AuditOutcome::Success)
                .identity(Some(&record.identity_id), Some(&record.email))
                .detail("revoked_sessions", revoked),
            now,
        );

        true
    }

    /// Remove expired and used tokens.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|_, t| t.is_usable_at(now));
        before - tokens.len()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}
