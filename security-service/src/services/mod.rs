//! Services layer for the security core.
//!
//! Every store is an explicitly constructed instance; [`SecurityCore`] wires
//! them together and owns their background sweepers.

pub mod access;
pub mod audit;
pub mod audit_query;
pub mod auth;
pub mod email;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod monitoring;
pub mod password_reset;
pub mod policy;
pub mod security_core;
pub mod sessions;
pub mod sweeper;
pub mod token;

pub use access::{AccessDenied, Permission};
pub use audit::{AlertSink, AuditRecorder, AuditSettings, TracingAlertSink};
pub use audit_query::{AuditQuery, AuditQueryEngine, AuditSummary};
pub use auth::{Authenticator, LoginFailure, LoginResult};
pub use email::{LogMailer, Mailer, RecordingMailer, SmtpMailer};
pub use error::ServiceError;
pub use identity::{IdentityDirectory, InMemoryIdentityDirectory};
pub use ledger::{LedgerSettings, LoginAttemptLedger};
pub use monitoring::{MonitorSettings, SecurityMonitor};
pub use password_reset::{PasswordResetService, ResetSettings};
pub use policy::{PolicyReport, PolicyService, PolicyViolation, StrengthLevel, StrengthReport};
pub use security_core::SecurityCore;
pub use sessions::{SessionSettings, SessionStore};
pub use sweeper::{BackgroundTasks, SweepSchedule};
pub use token::{TokenClaims, TokenService, TokenVerification};
