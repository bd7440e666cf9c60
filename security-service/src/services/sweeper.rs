//! Interval tasks that keep the in-memory stores bounded.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SweepSchedule {
    pub sessions: Duration,
    pub reset_tokens: Duration,
    pub audit_retention: Duration,
    pub ledger: Duration,
    pub monitor_scan: Duration,
}

impl Default for SweepSchedule {
    fn default() -> Self {
        Self {
            sessions: Duration::from_secs(3600),
            reset_tokens: Duration::from_secs(3600),
            audit_retention: Duration::from_secs(86_400),
            ledger: Duration::from_secs(86_400),
            monitor_scan: Duration::from_secs(300),
        }
    }
}

/// Owns the spawned sweepers. Dropping it without `shutdown` leaves them
/// running until the runtime stops.
pub struct BackgroundTasks {
    shutdown_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Run `job` every `period` until shutdown. The first run happens one
    /// period after spawning.
    pub fn spawn_periodic<F>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        let shutdown = self.shutdown_token.clone();
        let job = Arc::new(job);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately on the first tick
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(task = name, "Background task shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        let job = job.clone();
                        match tokio::task::spawn_blocking(move || job()).await {
                            Ok(affected) if affected > 0 => {
                                tracing::info!(task = name, affected, "Background task completed");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::error!(task = name, error = %e, "Background task failed");
                            }
                        }
                    }
                }
            }
        });

        tracing::info!(task = name, period_secs = period.as_secs(), "Background task started");
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel every task and wait for them to finish.
    pub async fn shutdown(self) {
        tracing::info!(tasks = self.handles.len(), "Stopping background tasks");
        self.shutdown_token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
    }
}
