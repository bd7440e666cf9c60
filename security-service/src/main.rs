use security_service::{
    build_router,
    config::{BootstrapAdmin, SecurityConfig},
    models::Role,
    services::{
        metrics::init_metrics, InMemoryIdentityDirectory, LogMailer, Mailer, SecurityCore,
        SmtpMailer,
    },
    utils::{password::hash_password_blocking, Password},
    AppState,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on invalid configuration
    let config = SecurityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    init_metrics()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to register metrics: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting security service"
    );

    let directory = Arc::new(InMemoryIdentityDirectory::new());
    if let Some(admin) = &config.bootstrap_admin {
        seed_admin(&directory, admin).await?;
    }

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::new(smtp).map_err(AppError::ConfigError)?;
            tracing::info!(host = %smtp.host, port = smtp.port, "SMTP mailer initialized");
            Arc::new(mailer)
        }
        None => {
            tracing::warn!("SMTP not configured, outgoing mail will be logged only");
            Arc::new(LogMailer)
        }
    };

    let core = SecurityCore::new(&config, directory, mailer);
    let tasks = core.start_background_tasks();
    tracing::info!(tasks = tasks.len(), "Background tasks started");

    let addr = config.common.socket_addr();
    let grace = Duration::from_secs(config.common.shutdown_grace_seconds);

    let state = AppState::new(config, core);
    let app = build_router(state).await?;

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if tokio::time::timeout(grace, tasks.shutdown()).await.is_err() {
        tracing::warn!(
            grace_seconds = grace.as_secs(),
            "Background tasks did not stop within the grace period"
        );
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn seed_admin(
    directory: &InMemoryIdentityDirectory,
    admin: &BootstrapAdmin,
) -> Result<(), AppError> {
    let password = Password::new(admin.password.expose_secret().clone());
    let hash = hash_password_blocking(password).await?;
    let identity = directory.register(&admin.display_name, &admin.email, Role::Admin, hash);
    tracing::info!(identity_id = %identity.id, email = %identity.email, "Bootstrap administrator registered");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
