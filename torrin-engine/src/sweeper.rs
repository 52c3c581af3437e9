//! Background sweeper for TTL-expired sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::service::UploadService;

/// Configuration for the cleanup sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to sweep expired sessions.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Periodic task that sweeps expired sessions until shutdown is signaled.
pub struct CleanupSweeper {
    config: SweeperConfig,
    service: Arc<UploadService>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl CleanupSweeper {
    /// Create a sweeper; send on the paired channel to stop it.
    pub fn new(
        config: SweeperConfig,
        service: Arc<UploadService>,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            config,
            service,
            shutdown_rx,
        }
    }

    /// Spawn the sweeper onto the runtime, returning its shutdown handle.
    pub fn spawn(
        config: SweeperConfig,
        service: Arc<UploadService>,
    ) -> (mpsc::Sender<()>, tokio::task::JoinHandle<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let mut sweeper = Self::new(config, service, shutdown_rx);
        let handle = tokio::spawn(async move { sweeper.run().await });
        (shutdown_tx, handle)
    }

    /// Run until the shutdown channel yields (or closes).
    pub async fn run(&mut self) {
        info!(interval = ?self.config.interval, "cleanup sweeper starting");
        let mut ticker = interval(self.config.interval);
        // The first tick fires immediately; skip it so a fresh server does
        // not sweep before it has served anything.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("cleanup sweeper received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.service.cleanup_expired_uploads().await;
                    if report.errors.iter().any(|e| e == "not supported") {
                        warn!("store cannot list expired sessions, stopping sweeper");
                        break;
                    }
                    for error in &report.errors {
                        warn!(error = %error, "cleanup error");
                    }
                    debug!(cleaned = report.cleaned, "sweep tick complete");
                }
            }
        }
    }
}
