//! Cooperative shutdown
//!
//! The first Ctrl-C (or SIGTERM) flips a watch flag; the orchestrator stops taking
//! new work, drains in-flight fetches and persists. A second signal exits at once.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Exit status used when a second signal forces the process down
pub const FORCED_EXIT_CODE: i32 = 130;

/// Shared shutdown flag
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns a receiver that observes the flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Requests a graceful shutdown
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Spawns the signal listener
    ///
    /// First signal: graceful shutdown. Second signal: `exit(130)`. The last
    /// checkpoint on disk stays valid because persists are atomic.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let shutdown = self.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::warn!("Shutdown requested, finishing in-flight requests (press Ctrl-C again to force quit)");
            shutdown.trigger();

            wait_for_signal().await;
            tracing::error!("Forced exit requested");
            std::process::exit(FORCED_EXIT_CODE);
        })
    }
}

/// Waits for Ctrl-C or, on Unix, SIGTERM
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = signal_or_park(tokio::signal::ctrl_c()) => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not install SIGTERM handler");
                signal_or_park(tokio::signal::ctrl_c()).await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal_or_park(tokio::signal::ctrl_c()).await;
    }
}

/// Resolves when `listener` reports a signal
///
/// A listener that fails to install resolves with an error at once; that is not a
/// signal, so it is logged and this never resolves.
async fn signal_or_park<F>(listener: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = listener.await {
        tracing::warn!(error = %e, "Could not install Ctrl-C handler");
        std::future::pending::<()>().await
    }
}

/// Resolves once the flag behind `rx` is set
///
/// If every sender is gone the flag can no longer change and this never resolves.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}
