use chrono::Duration;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::services::{
    AuditSettings, LedgerSettings, MonitorSettings, ResetSettings, SessionSettings, SweepSchedule,
};

/// Signing secret used when `TOKEN_SECRET` is unset outside production.
pub const DEV_TOKEN_SECRET: &str = "dev-only-token-secret-do-not-use-in-prod";

/// Longest duration any setting may span. Larger values would overflow
/// timestamp arithmetic.
const MAX_CONFIG_DAYS: i64 = 3650;

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub allowed_origins: Vec<String>,
    pub token: TokenConfig,
    pub lockout: LockoutConfig,
    pub session: SessionConfig,
    pub audit: AuditConfig,
    pub reset: ResetConfig,
    pub monitor: MonitorConfig,
    pub sweep: SweepConfig,
    pub rate_limit: RateLimitConfig,
    pub smtp: Option<SmtpConfig>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: Secret<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockoutConfig {
    pub max_attempts: u32,
    pub window_minutes: i64,
    pub retention_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub ttl_hours: i64,
    pub extended_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    pub capacity: usize,
    pub retention_days: i64,
    pub alert_threshold: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetConfig {
    pub ttl_hours: i64,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub unusual_hours_start: u32,
    pub unusual_hours_end: u32,
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    pub sessions_seconds: u64,
    pub reset_tokens_seconds: u64,
    pub audit_seconds: u64,
    pub ledger_seconds: u64,
    pub monitor_scan_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from: String,
}

/// Administrator seeded into the in-memory directory at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: Secret<String>,
    pub display_name: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "security-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            token: TokenConfig {
                secret: Secret::new(DEV_TOKEN_SECRET.to_string()),
            },
            lockout: LockoutConfig {
                max_attempts: 5,
                window_minutes: 15,
                retention_minutes: 60,
            },
            session: SessionConfig {
                ttl_hours: 24,
                extended_ttl_days: 30,
            },
            audit: AuditConfig {
                capacity: 10_000,
                retention_days: 90,
                alert_threshold: 70,
            },
            reset: ResetConfig {
                ttl_hours: 24,
                base_url: "http://localhost:3000".to_string(),
            },
            monitor: MonitorConfig {
                unusual_hours_start: 2,
                unusual_hours_end: 6,
                utc_offset_hours: 0,
            },
            sweep: SweepConfig {
                sessions_seconds: 3600,
                reset_tokens_seconds: 3600,
                audit_seconds: 86_400,
                ledger_seconds: 86_400,
                monitor_scan_seconds: 300,
            },
            rate_limit: RateLimitConfig {
                login_attempts: 20,
                login_window_seconds: 60,
            },
            smtp: None,
            bootstrap_admin: None,
        }
    }
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let smtp = match get_optional("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: get_parsed("SMTP_PORT", "587", is_prod)?,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", None, is_prod)?),
                from: get_env("SMTP_FROM", None, is_prod)?,
            }),
            None => None,
        };

        let bootstrap_admin = match get_optional("BOOTSTRAP_ADMIN_EMAIL") {
            Some(email) => Some(BootstrapAdmin {
                email,
                password: Secret::new(get_env("BOOTSTRAP_ADMIN_PASSWORD", None, true)?),
                display_name: get_env("BOOTSTRAP_ADMIN_NAME", Some("Administrator"), false)?,
            }),
            None => None,
        };

        let config = SecurityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("security-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional("OTLP_ENDPOINT"),
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            token: TokenConfig {
                secret: Secret::new(get_env("TOKEN_SECRET", Some(DEV_TOKEN_SECRET), is_prod)?),
            },
            lockout: LockoutConfig {
                max_attempts: get_parsed("LOCKOUT_MAX_ATTEMPTS", "5", is_prod)?,
                window_minutes: get_parsed("LOCKOUT_WINDOW_MINUTES", "15", is_prod)?,
                retention_minutes: get_parsed("LOGIN_ATTEMPT_RETENTION_MINUTES", "60", is_prod)?,
            },
            session: SessionConfig {
                ttl_hours: get_parsed("SESSION_TTL_HOURS", "24", is_prod)?,
                extended_ttl_days: get_parsed("SESSION_EXTENDED_TTL_DAYS", "30", is_prod)?,
            },
            audit: AuditConfig {
                capacity: get_parsed("AUDIT_CAPACITY", "10000", is_prod)?,
                retention_days: get_parsed("AUDIT_RETENTION_DAYS", "90", is_prod)?,
                alert_threshold: get_parsed("AUDIT_ALERT_THRESHOLD", "70", is_prod)?,
            },
            reset: ResetConfig {
                ttl_hours: get_parsed("RESET_TOKEN_TTL_HOURS", "24", is_prod)?,
                base_url: get_env("RESET_BASE_URL", Some("http://localhost:3000"), is_prod)?,
            },
            monitor: MonitorConfig {
                unusual_hours_start: get_parsed("MONITOR_UNUSUAL_HOURS_START", "2", is_prod)?,
                unusual_hours_end: get_parsed("MONITOR_UNUSUAL_HOURS_END", "6", is_prod)?,
                utc_offset_hours: get_parsed("MONITOR_UTC_OFFSET_HOURS", "0", is_prod)?,
            },
            sweep: SweepConfig {
                sessions_seconds: get_parsed("SWEEP_SESSIONS_SECONDS", "3600", is_prod)?,
                reset_tokens_seconds: get_parsed("SWEEP_RESET_TOKENS_SECONDS", "3600", is_prod)?,
                audit_seconds: get_parsed("SWEEP_AUDIT_SECONDS", "86400", is_prod)?,
                ledger_seconds: get_parsed("SWEEP_LEDGER_SECONDS", "86400", is_prod)?,
                monitor_scan_seconds: get_parsed("MONITOR_SCAN_SECONDS", "300", is_prod)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: get_parsed("RATE_LIMIT_LOGIN_ATTEMPTS", "20", is_prod)?,
                login_window_seconds: get_parsed(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
            smtp,
            bootstrap_admin,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let positive = [
            ("LOCKOUT_MAX_ATTEMPTS", i64::from(self.lockout.max_attempts)),
            ("LOCKOUT_WINDOW_MINUTES", self.lockout.window_minutes),
            ("LOGIN_ATTEMPT_RETENTION_MINUTES", self.lockout.retention_minutes),
            ("SESSION_TTL_HOURS", self.session.ttl_hours),
            ("SESSION_EXTENDED_TTL_DAYS", self.session.extended_ttl_days),
            ("AUDIT_RETENTION_DAYS", self.audit.retention_days),
            ("RESET_TOKEN_TTL_HOURS", self.reset.ttl_hours),
            ("RATE_LIMIT_LOGIN_ATTEMPTS", i64::from(self.rate_limit.login_attempts)),
        ];
        for (key, value) in positive {
            if value <= 0 {
                return Err(config_error(format!("{} must be positive", key)));
            }
        }

        let durations = [
            ("LOCKOUT_WINDOW_MINUTES", minutes(self.lockout.window_minutes)),
            ("LOGIN_ATTEMPT_RETENTION_MINUTES", minutes(self.lockout.retention_minutes)),
            ("SESSION_TTL_HOURS", hours(self.session.ttl_hours)),
            ("SESSION_EXTENDED_TTL_DAYS", days(self.session.extended_ttl_days)),
            ("AUDIT_RETENTION_DAYS", days(self.audit.retention_days)),
            ("RESET_TOKEN_TTL_HOURS", hours(self.reset.ttl_hours)),
        ];
        for (key, value) in durations {
            if value.is_none() {
                return Err(config_error(format!(
                    "{} must not exceed {} days",
                    key, MAX_CONFIG_DAYS
                )));
            }
        }

        if self.lockout.retention_minutes < self.lockout.window_minutes {
            return Err(config_error(
                "LOGIN_ATTEMPT_RETENTION_MINUTES must not be shorter than LOCKOUT_WINDOW_MINUTES",
            ));
        }
        let monitor_window = MonitorSettings::default().window;
        if minutes(self.lockout.retention_minutes).is_some_and(|r| r < monitor_window) {
            return Err(config_error(format!(
                "LOGIN_ATTEMPT_RETENTION_MINUTES must cover the {} minute monitor window",
                monitor_window.num_minutes()
            )));
        }

        if self.audit.capacity == 0 {
            return Err(config_error("AUDIT_CAPACITY must be positive"));
        }
        if self.audit.alert_threshold > 100 {
            return Err(config_error("AUDIT_ALERT_THRESHOLD must be between 0 and 100"));
        }

        let sweeps = [
            self.sweep.sessions_seconds,
            self.sweep.reset_tokens_seconds,
            self.sweep.audit_seconds,
            self.sweep.ledger_seconds,
            self.sweep.monitor_scan_seconds,
            self.rate_limit.login_window_seconds,
        ];
        if sweeps.iter().any(|s| *s == 0) {
            return Err(config_error("Sweep and rate limit periods must be positive"));
        }

        if self.monitor.unusual_hours_start > 23 || self.monitor.unusual_hours_end > 23 {
            return Err(config_error("MONITOR_UNUSUAL_HOURS_* must be within 0..=23"));
        }
        if !(-12..=14).contains(&self.monitor.utc_offset_hours) {
            return Err(config_error("MONITOR_UTC_OFFSET_HOURS must be within -12..=14"));
        }

        if self.environment == Environment::Prod {
            let secret = self.token.secret.expose_secret();
            if secret == DEV_TOKEN_SECRET || secret.len() < 32 {
                return Err(config_error(
                    "TOKEN_SECRET must be set to at least 32 characters in production",
                ));
            }

            if self.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin not allowed in production"));
            }

            if self.smtp.is_none() {
                tracing::warn!("SMTP is not configured in production, reset emails will only be logged");
            }
        }

        Ok(())
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            max_attempts: self.lockout.max_attempts,
            window: minutes(self.lockout.window_minutes).unwrap_or_else(max_duration),
            retention: minutes(self.lockout.retention_minutes).unwrap_or_else(max_duration),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            ttl: hours(self.session.ttl_hours).unwrap_or_else(max_duration),
            extended_ttl: days(self.session.extended_ttl_days).unwrap_or_else(max_duration),
        }
    }

    pub fn audit_settings(&self) -> AuditSettings {
        AuditSettings {
            capacity: self.audit.capacity,
            retention: days(self.audit.retention_days).unwrap_or_else(max_duration),
            alert_threshold: self.audit.alert_threshold,
        }
    }

    pub fn reset_settings(&self) -> ResetSettings {
        ResetSettings {
            ttl: hours(self.reset.ttl_hours).unwrap_or_else(max_duration),
            base_url: self.reset.base_url.clone(),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            unusual_hours_start: self.monitor.unusual_hours_start,
            unusual_hours_end: self.monitor.unusual_hours_end,
            utc_offset_hours: self.monitor.utc_offset_hours,
            ..MonitorSettings::default()
        }
    }

    pub fn sweep_schedule(&self) -> SweepSchedule {
        use std::time::Duration as StdDuration;
        SweepSchedule {
            sessions: StdDuration::from_secs(self.sweep.sessions_seconds),
            reset_tokens: StdDuration::from_secs(self.sweep.reset_tokens_seconds),
            audit_retention: StdDuration::from_secs(self.sweep.audit_seconds),
            ledger: StdDuration::from_secs(self.sweep.ledger_seconds),
            monitor_scan: StdDuration::from_secs(self.sweep.monitor_scan_seconds),
        }
    }
}

// Converters fall back to the cap for values `validate` would reject.
fn max_duration() -> Duration {
    Duration::days(MAX_CONFIG_DAYS)
}

fn bounded(duration: Option<Duration>) -> Option<Duration> {
    duration.filter(|d| *d <= max_duration())
}

fn minutes(value: i64) -> Option<Duration> {
    bounded(Duration::try_minutes(value))
}

fn hours(value: i64) -> Option<Duration> {
    bounded(Duration::try_hours(value))
}

fn days(value: i64) -> Option<Duration> {
    bounded(Duration::try_days(value))
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.into()))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(config_error(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(config_error(format!("{} is required but not set", key)))
            }
        }
    }
}

fn get_parsed<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim()
        .parse()
        .map_err(|e: T::Err| config_error(format!("{} has an invalid value {:?}: {}", key, raw, e)))
}

fn get_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
