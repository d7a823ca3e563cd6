//! Graceful shutdown coordination.
//!
//! One coordinator owns the shutdown signal: OS signals or an explicit
//! trigger flip a watch channel that the HTTP server and every
//! background loop observe.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Broadcasts the process-wide shutdown signal.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
    triggered: AtomicBool,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx,
            rx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Subscribe to the shutdown signal.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Trigger shutdown. Idempotent.
    pub fn trigger(&self, reason: &str) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        info!(reason, "Initiating graceful shutdown");
        let _ = self.tx.send(true);
    }

    /// Future that resolves when shutdown fires; hand this to
    /// `axum::serve(...).with_graceful_shutdown`.
    pub fn signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.subscribe();
        async move {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Listen for SIGINT/SIGTERM and trigger shutdown when one arrives.
    pub async fn listen_for_signals(&self) {
        let ctrl_c = async {
            let _ = signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => self.trigger("SIGINT"),
            () = terminate => self.trigger("SIGTERM"),
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_flips_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert!(!*rx.borrow());
        assert!(!coordinator.is_shutting_down());

        coordinator.trigger("test");
        assert!(coordinator.is_shutting_down());
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_trigger_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.trigger("first");
        coordinator.trigger("second");
        assert!(coordinator.is_shutting_down());
    }

    #[tokio::test]
    async fn test_signal_future_resolves() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.signal();
        coordinator.trigger("test");
        tokio::time::timeout(Duration::from_secs(1), signal)
            .await
            .expect("signal future did not resolve");
    }
}
