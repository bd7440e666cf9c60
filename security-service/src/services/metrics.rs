use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static LOGIN_ATTEMPTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static ACCOUNT_LOCKOUTS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static HIGH_RISK_AUDIT_EVENTS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
pub static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Create and register every collector. Calling it again is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;
    let request_duration = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;
    let login_attempts = IntCounterVec::new(
        Opts::new("login_attempts_total", "Login attempts by outcome"),
        &["outcome"],
    )?;
    let lockouts = IntCounter::new(
        "account_lockouts_total",
        "Times an email reached the failed-attempt threshold",
    )?;
    let high_risk = IntCounter::new(
        "high_risk_audit_events_total",
        "Audit events at or above the alert threshold",
    )?;
    let active_sessions = IntGauge::new("active_sessions", "Sessions currently held in memory")?;

    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(request_duration.clone()))?;
    registry.register(Box::new(login_attempts.clone()))?;
    registry.register(Box::new(lockouts.clone()))?;
    registry.register(Box::new(high_risk.clone()))?;
    registry.register(Box::new(active_sessions.clone()))?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = LOGIN_ATTEMPTS_TOTAL.set(login_attempts);
    let _ = ACCOUNT_LOCKOUTS_TOTAL.set(lockouts);
    let _ = HIGH_RISK_AUDIT_EVENTS_TOTAL.set(high_risk);
    let _ = ACTIVE_SESSIONS.set(active_sessions);

    Ok(())
}

pub fn record_login(outcome: &str) {
    if let Some(counter) = LOGIN_ATTEMPTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_lockout() {
    if let Some(counter) = ACCOUNT_LOCKOUTS_TOTAL.get() {
        counter.inc();
    }
}

pub fn record_high_risk_event() {
    if let Some(counter) = HIGH_RISK_AUDIT_EVENTS_TOTAL.get() {
        counter.inc();
    }
}

pub fn set_active_sessions(count: usize) {
    if let Some(gauge) = ACTIVE_SESSIONS.get() {
        gauge.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
