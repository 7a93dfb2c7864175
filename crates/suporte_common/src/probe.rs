//! File-server connectivity probing.
//!
//! A bounded TCP connect against the fixed file-server address. Callers
//! only ever need a boolean, so every failure class (DNS, refusal,
//! timeout) collapses to "unreachable". The watcher re-probes on a fixed
//! interval and publishes status changes over a watch channel for the
//! status indicator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Connectivity as shown by the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerStatus {
    /// First probe has not completed yet
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServerStatus::Connecting => "conectando",
            ServerStatus::Connected => "conectado",
            ServerStatus::Disconnected => "desconectado",
        };
        write!(f, "{text}")
    }
}

/// Check whether `addr` (host:port) accepts a TCP connection within
/// `timeout`. Any failure is `false`; no error detail is surfaced.
pub async fn is_reachable(addr: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            debug!("Probe of {} failed: {}", addr, e);
            false
        }
        Err(_) => {
            debug!("Probe of {} timed out", addr);
            false
        }
    }
}

/// Background task that re-probes the file server on a fixed interval.
///
/// Status starts at [`ServerStatus::Connecting`] and is published over a
/// watch channel after every probe. Stopped explicitly via [`stop`], or
/// implicitly when every receiver is dropped.
///
/// [`stop`]: ConnectivityWatcher::stop
pub struct ConnectivityWatcher {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
    status_rx: watch::Receiver<ServerStatus>,
}

impl ConnectivityWatcher {
    pub fn spawn(addr: String, timeout: Duration, interval: Duration) -> Self {
        let (status_tx, status_rx) = watch::channel(ServerStatus::Connecting);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            // First tick fires immediately, so the indicator leaves
            // "connecting" as soon as the first probe answers.
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let status = if is_reachable(&addr, timeout).await {
                            ServerStatus::Connected
                        } else {
                            ServerStatus::Disconnected
                        };
                        if status_tx.send(status).is_err() {
                            break;
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            handle,
            shutdown: Some(shutdown_tx),
            status_rx,
        }
    }

    /// Latest observed status.
    pub fn status(&self) -> ServerStatus {
        *self.status_rx.borrow()
    }

    /// A receiver for waiting on status changes.
    pub fn subscribe(&self) -> watch::Receiver<ServerStatus> {
        self.status_rx.clone()
    }

    /// Stop the background task and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}
