//! Server-wide shutdown: a token that stops the accept loop and every
//! session, and a tracker that keeps the server alive until those sessions
//! have closed their sockets.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Upper bound on how long [`ShutdownCoordinator::drain`] waits by default.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the shutdown signal and the set of live sessions.
///
/// Upgraded sockets run outside the HTTP server task, so awaiting that task
/// alone would let the runtime exit before sessions send their close frame
/// and release their operations. Each session holds a [`TaskTrackerToken`]
/// for its whole lifetime; [`drain`](Self::drain) waits for all of them.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Coordinator with no sessions and no shutdown in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a session. It counts as live until the token is dropped.
    pub fn track_session(&self) -> TaskTrackerToken {
        self.sessions.token()
    }

    /// Sessions still holding their token.
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Start shutdown without waiting. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
        let _ = self.sessions.close();
    }

    /// Start shutdown, then wait for `server` and every tracked session.
    ///
    /// Returns `false` if `timeout` (default 10s) elapsed first; whatever is
    /// still running is left detached.
    pub async fn drain(&self, server: JoinHandle<()>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(sessions = self.sessions.len(), ?timeout, "draining");

        let sessions = self.sessions.clone();
        let everything = async move {
            let _ = server.await;
            sessions.wait().await;
        };
        if tokio::time::timeout(timeout, everything).await.is_ok() {
            info!("drained");
            true
        } else {
            warn!(sessions = self.sessions.len(), "drain timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_server() -> JoinHandle<()> {
        tokio::spawn(async {})
    }

    #[tokio::test]
    async fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(token.is_cancelled());
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_sessions_to_finish_closing() {
        let coord = ShutdownCoordinator::new();
        let signal = coord.token();
        let tracked = coord.track_session();
        let session = tokio::spawn(async move {
            signal.cancelled().await;
            // Time spent flushing the close frame.
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(tracked);
        });
        assert_eq!(coord.live_sessions(), 1);

        assert!(coord.drain(idle_server(), None).await);
        assert_eq!(coord.live_sessions(), 0);
        session.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_on_a_stuck_session() {
        let coord = ShutdownCoordinator::new();
        let _stuck = coord.track_session();
        let drained = coord
            .drain(idle_server(), Some(Duration::from_millis(100)))
            .await;
        assert!(!drained);
        assert_eq!(coord.live_sessions(), 1);
    }

    #[tokio::test]
    async fn drain_without_sessions_returns_once_server_stops() {
        let coord = ShutdownCoordinator::new();
        let signal = coord.token();
        let server = tokio::spawn(async move { signal.cancelled().await });
        assert!(coord.drain(server, None).await);
    }
}
