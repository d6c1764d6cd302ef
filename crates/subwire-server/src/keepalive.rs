//! Per-connection keep-alive timer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use subwire_protocol::Frame;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::connection::ConnectionHandle;

/// Why the keep-alive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveExit {
    /// Invalidated by connection teardown.
    Cancelled,
    /// The connection stopped accepting frames.
    Closed,
}

#[derive(Debug, Default)]
enum TimerState {
    #[default]
    Idle,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<KeepAliveExit>,
    },
    Invalidated,
}

/// The single keep-alive timer of one connection.
///
/// Starts at most once and is invalidated at most once; every teardown path
/// may call [`KeepAlive::invalidate`] and only the first does anything.
#[derive(Debug, Default)]
pub struct KeepAlive {
    state: Mutex<TimerState>,
}

impl KeepAlive {
    /// An idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start sending keep-alive frames every `interval`.
    ///
    /// Returns `false` if the timer already ran or was invalidated.
    pub fn start(&self, handle: Arc<ConnectionHandle>, interval: Duration) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, TimerState::Idle) {
            return false;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_keep_alive(handle, interval, cancel.clone()));
        *state = TimerState::Running { cancel, task };
        true
    }

    /// Stop the timer for good. Returns `true` only on the first call.
    pub fn invalidate(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), TimerState::Invalidated);
        match previous {
            TimerState::Invalidated => false,
            TimerState::Idle => true,
            TimerState::Running { cancel, task } => {
                cancel.cancel();
                drop(task);
                true
            }
        }
    }

    /// Whether the timer task is live.
    pub fn is_running(&self) -> bool {
        match &*self.state.lock() {
            TimerState::Running { task, .. } => !task.is_finished(),
            _ => false,
        }
    }

    /// Whether the timer has been invalidated.
    pub fn is_invalidated(&self) -> bool {
        matches!(*self.state.lock(), TimerState::Invalidated)
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        let _ = self.invalidate();
    }
}

/// Send [`Frame::KeepAlive`] on `handle` every `interval` until cancelled.
///
/// The first frame goes out one full interval after the call.
pub async fn run_keep_alive(
    handle: Arc<ConnectionHandle>,
    interval: Duration,
    cancel: CancellationToken,
) -> KeepAliveExit {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return KeepAliveExit::Cancelled,
            _ = ticker.tick() => {
                trace!(connection_id = %handle.id(), "keep-alive");
                if !handle.send(Frame::KeepAlive) {
                    return KeepAliveExit::Closed;
                }
            }
        }
    }
}
