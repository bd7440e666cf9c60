//! Wiring of every store and service into one injectable container.

use secrecy::ExposeSecret;
use std::sync::Arc;

use crate::config::SecurityConfig;
use crate::services::{
    AuditQueryEngine, AuditRecorder, Authenticator, BackgroundTasks, IdentityDirectory,
    LoginAttemptLedger, Mailer, PasswordResetService, SecurityMonitor, SessionStore,
    SweepSchedule, TokenService,
};

#[derive(Clone)]
pub struct SecurityCore {
    pub directory: Arc<dyn IdentityDirectory>,
    pub audit: Arc<AuditRecorder>,
    pub ledger: Arc<LoginAttemptLedger>,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionStore>,
    pub authenticator: Arc<Authenticator>,
    pub password_reset: Arc<PasswordResetService>,
    pub audit_query: Arc<AuditQueryEngine>,
    pub monitor: Arc<SecurityMonitor>,
    schedule: SweepSchedule,
}

impl SecurityCore {
    pub fn new(
        config: &SecurityConfig,
        directory: Arc<dyn IdentityDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let audit = Arc::new(AuditRecorder::new(config.audit_settings()));
        let ledger = Arc::new(LoginAttemptLedger::new(
            config.ledger_settings(),
            audit.clone(),
        ));
        let tokens = Arc::new(TokenService::new(config.token.secret.expose_secret()));
        let sessions = Arc::new(SessionStore::new(
            config.session_settings(),
            tokens.clone(),
            audit.clone(),
        ));
        let authenticator = Arc::new(Authenticator::new(
            directory.clone(),
            ledger.clone(),
            sessions.clone(),
            audit.clone(),
        ));
        let password_reset = Arc::new(PasswordResetService::new(
            config.reset_settings(),
            directory.clone(),
            mailer,
            sessions.clone(),
            audit.clone(),
        ));
        let audit_query = Arc::new(AuditQueryEngine::new(audit.clone()));
        let monitor = Arc::new(SecurityMonitor::new(
            ledger.clone(),
            config.monitor_settings(),
        ));

        Self {
            directory,
            audit,
            ledger,
            tokens,
            sessions,
            authenticator,
            password_reset,
            audit_query,
            monitor,
            schedule: config.sweep_schedule(),
        }
    }

    /// Spawn the expiry sweepers and the monitoring scan. The returned handle
    /// must be shut down to stop them.
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let sessions = self.sessions.clone();
        tasks.spawn_periodic("session_sweep", self.schedule.sessions, move || {
            sessions.sweep_expired()
        });

        let password_reset = self.password_reset.clone();
        tasks.spawn_periodic("reset_token_sweep", self.schedule.reset_tokens, move || {
            password_reset.sweep_expired()
        });

        let audit = self.audit.clone();
        tasks.spawn_periodic("audit_retention", self.schedule.audit_retention, move || {
            audit.sweep_retention()
        });

        let ledger = self.ledger.clone();
        tasks.spawn_periodic("ledger_cleanup", self.schedule.ledger, move || {
            ledger.prune_expired()
        });

        let monitor = self.monitor.clone();
        tasks.spawn_periodic("security_monitor", self.schedule.monitor_scan, move || {
            monitor.scan().len()
        });

        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::{InMemoryIdentityDirectory, RecordingMailer};
    use crate::utils::password::{hash_password, Password};

    #[tokio::test]
    async fn test_core_wires_shared_stores() {
        let directory = Arc::new(InMemoryIdentityDirectory::new());
        directory.register(
            "Admin",
            "admin@x.com",
            Role::Admin,
            hash_password(&Password::new("Admin#Pass123")).unwrap(),
        );
        let core = SecurityCore::new(
            &SecurityConfig::default(),
            directory,
            Arc::new(RecordingMailer::new()),
        );

        let result = core
            .authenticator
            .authenticate("admin@x.com", &Password::new("Admin#Pass123"), None, None, false)
            .await;
        assert!(result.success);
        assert_eq!(core.sessions.active_count(), 1);
        assert_eq!(core.ledger.len(), 1);
        // login_success and session_created
        assert_eq!(core.audit.len(), 2);

        let tasks = core.start_background_tasks();
        assert_eq!(tasks.len(), 5);
        tasks.shutdown().await;
    }
}
