//! Login orchestration.
//!
//! Attempts for one email are serialized so the lockout check and the
//! recording of the attempt cannot interleave with another attempt for the
//! same email. Every failure mode that could reveal whether an account
//! exists is answered with the same message.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{
    normalize_email, AuditOutcome, FailureReason, Identity, NewAuditEvent, SessionInfo,
};
use crate::services::{
    AuditRecorder, IdentityDirectory, LoginAttemptLedger, PolicyService, ServiceError,
    SessionStore,
};
use crate::utils::password::{
    dummy_verify, hash_password_blocking, verify_password_blocking, Password,
};

pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";
pub const ACCOUNT_LOCKED_MESSAGE: &str =
    "Too many failed login attempts. Please try again later.";
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred. Please try again later.";

/// How a login failed, for the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    Locked,
    InvalidCredentials,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<LoginFailure>,
}

impl LoginResult {
    fn failed(failure: LoginFailure) -> Self {
        let message = match failure {
            LoginFailure::Locked => ACCOUNT_LOCKED_MESSAGE,
            LoginFailure::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE,
            LoginFailure::Internal => INTERNAL_ERROR_MESSAGE,
        };
        Self {
            success: false,
            identity: None,
            token: None,
            session: None,
            error: Some(message.to_string()),
            failure: Some(failure),
        }
    }
}

pub struct Authenticator {
    directory: Arc<dyn IdentityDirectory>,
    ledger: Arc<LoginAttemptLedger>,
    sessions: Arc<SessionStore>,
    audit: Arc<AuditRecorder>,
    email_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Authenticator {
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        ledger: Arc<LoginAttemptLedger>,
        sessions: Arc<SessionStore>,
        audit: Arc<AuditRecorder>,
    ) -> Self {
        Self {
            directory,
            ledger,
            sessions,
            audit,
            email_locks: DashMap::new(),
        }
    }

    pub async fn authenticate(
        &self,
        email: &str,
        password: &Password,
        origin_ip: Option<&str>,
        user_agent: Option<&str>,
        remember_me: bool,
    ) -> LoginResult {
        let email = normalize_email(email);

        let lock = self
            .email_locks
            .entry(email.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.attempt(&email, password, origin_ip, user_agent, remember_me)
                .await
        };

        // Map entry plus our clone: nobody else is waiting on this email.
        self.email_locks
            .remove_if(&email, |_, l| Arc::strong_count(l) <= 2);

        result
    }

    async fn attempt(
        &self,
        email: &str,
        password: &Password,
        origin_ip: Option<&str>,
        user_agent: Option<&str>,
        remember_me: bool,
    ) -> LoginResult {
        if !self.ledger.may_attempt(email, origin_ip) {
            tracing::warn!(email = %email, origin_ip = origin_ip.unwrap_or("-"), "Login rejected, account locked");
            self.ledger.record(
                email,
                false,
                origin_ip,
                user_agent,
                Some(FailureReason::AccountLocked),
            );
            return LoginResult::failed(LoginFailure::Locked);
        }

        match self
            .verify_credentials(email, password, origin_ip, user_agent, remember_me)
            .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(reason)) => {
                tracing::info!(email = %email, reason = reason.as_str(), "Login failed");
                self.ledger
                    .record(email, false, origin_ip, user_agent, Some(reason));
                LoginResult::failed(LoginFailure::InvalidCredentials)
            }
            Err(e) => {
                tracing::error!(error = ?e, email = %email, "Login failed with internal error");
                self.ledger.record(
                    email,
                    false,
                    origin_ip,
                    user_agent,
                    Some(FailureReason::SystemError),
                );
                LoginResult::failed(LoginFailure::Internal)
            }
        }
    }

    /// Outer error: unexpected failure. Inner error: credentials rejected.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &Password,
        origin_ip: Option<&str>,
        user_agent: Option<&str>,
        remember_me: bool,
    ) -> Result<Result<LoginResult, FailureReason>, anyhow::Error> {
        let identity = match self.directory.find_by_email(email).await? {
            Some(identity) => identity,
            None => {
                dummy_verify(password.clone()).await;
                return Ok(Err(FailureReason::UserNotFound));
            }
        };

        let stored = match self.directory.credential_for(&identity.id).await? {
            Some(hash) => hash,
            None => {
                dummy_verify(password.clone()).await;
                return Ok(Err(FailureReason::InvalidPassword));
            }
        };

        if !verify_password_blocking(password.clone(), stored).await? {
            return Ok(Err(FailureReason::InvalidPassword));
        }

        if !identity.active {
            return Ok(Err(FailureReason::AccountDisabled));
        }

        let session = self
            .sessions
            .create(&identity, remember_me, origin_ip, user_agent)?;
        self.ledger.record(email, true, origin_ip, user_agent, None);

        tracing::info!(
            identity_id = %identity.id,
            session_id = %session.id,
            "Login succeeded"
        );

        Ok(Ok(LoginResult {
            success: true,
            identity: Some(identity),
            token: Some(session.token.clone()),
            session: Some(SessionInfo::from(&session)),
            error: None,
            failure: None,
        }))
    }

    /// End the session behind `token`. Unknown tokens are not an error.
    pub fn logout(&self, token: &str) -> bool {
        self.sessions.destroy(token)
    }

    /// Replace the caller's password after checking the current one. Every
    /// other session of the identity is revoked.
    pub async fn change_password(
        &self,
        identity_id: &str,
        current: &Password,
        new: &Password,
        keep_token: Option<&str>,
    ) -> Result<(), ServiceError> {
        let identity = self
            .directory
            .find_by_id(identity_id)
            .await?
            .ok_or(ServiceError::NotFound("Identity"))?;

        let stored = self
            .directory
            .credential_for(identity_id)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !verify_password_blocking(current.clone(), stored).await? {
            self.audit.log(
                NewAuditEvent::password("password_change_failed", AuditOutcome::Failure)
                    .identity(Some(&identity.id), Some(&identity.email))
                    .detail("reason", "invalid_current_password"),
            );
            return Err(ServiceError::InvalidCredentials);
        }

        let report = PolicyService::validate_password(new.as_str());
        if !report.valid {
            return Err(ServiceError::Validation(report.violations));
        }

        let hash = hash_password_blocking(new.clone()).await?;
        self.directory.update_credential(identity_id, hash).await?;
        let revoked = self.sessions.destroy_all_for(identity_id, keep_token);

        tracing::info!(identity_id = %identity_id, revoked, "Password changed");
        self.audit.log(
            NewAuditEvent::password("password_changed", AuditOutcome::Success)
                .identity(Some(&identity.id), Some(&identity.email))
                .detail("revoked_sessions", revoked),
        );

        Ok(())
    }
}
