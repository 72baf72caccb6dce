//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Cancelling the token stops the HTTP listener and the hub. The hub closes
//! every outbound queue, so each client actor flushes what it has queued,
//! sends a close frame and exits. Client actors are tracked separately
//! because upgraded sockets outlive the HTTP server future.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Default drain budget when none is configured.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown across the listener, the hub and every
/// client actor.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for per-connection tasks.
    pub fn connections(&self) -> &TaskTracker {
        &self.connections
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Perform a graceful shutdown.
    ///
    /// 1. Cancel the shutdown token (listener and hub stop)
    /// 2. Wait up to `timeout` for `handles` and every tracked connection
    /// 3. Give up on whatever is still running after that
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.connections.close();
        info!(
            task_count = handles.len(),
            connections = self.connections.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.connections.wait().await;
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timed out after {timeout:?}, some connections may still be open");
        } else {
            info!("drain complete");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
