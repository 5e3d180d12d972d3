//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! On a signal the HTTP server stops accepting requests, and running
//! backup/restore operations get a bounded window to finish before the
//! process exits (exiting kills any tool still running).

use crate::api::job_tracker::JobTracker;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// How long running operations may take to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Get a shutdown receiver
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Wait for shutdown signal (SIGTERM or SIGINT)
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        self.trigger();
    }

    /// Broadcast the shutdown signal to all subscribers
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to broadcast shutdown signal: {}", e);
        }
    }

    /// Give running operations a chance to finish
    pub async fn drain(&self, tracker: &JobTracker) {
        let running = tracker.running_count().await;
        if running == 0 {
            info!("Graceful shutdown complete");
            return;
        }

        info!(running, "Waiting for running operations to finish");
        if tracker.wait_idle(SHUTDOWN_GRACE).await {
            info!("Graceful shutdown complete");
        } else {
            warn!(
                running = tracker.running_count().await,
                "Operations still running after shutdown grace period, exiting anyway"
            );
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
