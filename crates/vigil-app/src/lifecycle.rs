//! Shutdown signalling.
//!
//! SIGINT/SIGTERM (Ctrl+C elsewhere) flips a `watch` flag that the monitor
//! loop checks between ticks.

use tokio::sync::watch;
use tracing::{error, info};

pub struct LifecycleManager {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    /// Receiver that turns `true` once shutdown is requested.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Requests shutdown of every subscriber.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits for SIGINT or SIGTERM, then requests shutdown.
    ///
    /// If the handlers cannot be installed this never returns.
    pub async fn wait_for_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let handlers = signal(SignalKind::interrupt())
                .and_then(|sigint| Ok((sigint, signal(SignalKind::terminate())?)));
            let (mut sigint, mut sigterm) = match handlers {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to install signal handlers");
                    std::future::pending::<()>().await;
                    return;
                }
            };

            tokio::select! {
                _ = sigint.recv() => info!("SIGINT received"),
                _ = sigterm.recv() => info!("SIGTERM received"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
                return;
            }
            info!("Ctrl+C received");
        }

        self.shutdown();
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        let lm = LifecycleManager::new();
        assert!(!*lm.subscribe().borrow());
    }

    #[tokio::test]
    async fn shutdown_reaches_subscribers() {
        let lm = LifecycleManager::new();
        let mut rx = lm.subscribe();
        lm.shutdown();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
