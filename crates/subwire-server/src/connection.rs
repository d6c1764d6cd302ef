//! Per-socket connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use subwire_core::ConnectionId;
use subwire_protocol::{CloseCode, Dialect, Frame};
use tokio::sync::mpsc;
use tracing::debug;

use crate::context::OperationContext;
use crate::keepalive::KeepAlive;

/// Message queued for the socket writer task.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    /// A protocol frame, encoded by the writer in the connection's dialect.
    Frame(Frame),
    /// Close the socket; nothing is written after this.
    Close {
        /// Close code.
        code: CloseCode,
        /// Close reason.
        reason: String,
    },
}

/// Shared, cloneable sending side of one connection.
///
/// The dispatcher, the keep-alive timer, and operation tasks all write
/// through this handle; the writer task drains it in order.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    dialect: Dialect,
    tx: mpsc::UnboundedSender<Outbound>,
    closing: AtomicBool,
    connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle writing into `tx`.
    pub fn new(id: ConnectionId, dialect: Dialect, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id,
            dialect,
            tx,
            closing: AtomicBool::new(false),
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Negotiated dialect.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Queue a frame.
    ///
    /// Returns `false` once the connection is closing or the writer is gone,
    /// and counts the frame as dropped.
    pub fn send(&self, frame: Frame) -> bool {
        if self.is_closing() {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.tx.send(Outbound::Frame(frame)).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Queue a close. Only the first call has an effect.
    pub fn close(&self, code: CloseCode, reason: impl Into<String>) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!(connection_id = %self.id, code = code.code(), "closing connection");
        self.tx
            .send(Outbound::Close {
                code,
                reason: reason.into(),
            })
            .is_ok()
    }

    /// Whether a close has been queued.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Frames dropped because the connection was closing or gone.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Lifecycle phase of a connection. `Terminated` is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Socket open, handshake not yet received.
    Pending,
    /// Handshake acknowledged.
    Active,
    /// Torn down; every further command is ignored.
    Terminated,
}

/// State owned by one session's reader loop.
#[derive(Debug)]
pub struct ConnectionState {
    /// Sending side, shared with the orchestrator.
    pub handle: Arc<ConnectionHandle>,
    /// Current phase.
    pub phase: Phase,
    /// Context handed to operations.
    pub context: Arc<OperationContext>,
    /// The connection's single keep-alive timer.
    pub keep_alive: KeepAlive,
    /// Whether the orchestrator has been told about this connection.
    pub connected: bool,
}

impl ConnectionState {
    /// Fresh `Pending` state.
    pub fn new(handle: Arc<ConnectionHandle>, context: OperationContext) -> Self {
        Self {
            handle,
            phase: Phase::Pending,
            context: Arc::new(context),
            keep_alive: KeepAlive::new(),
            connected: false,
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        self.handle.id()
    }

    /// Build a state together with the receiving end of its outbound queue.
    pub fn channel(dialect: Dialect) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        let handle = Arc::new(ConnectionHandle::new(id.clone(), dialect, tx));
        (Self::new(handle, OperationContext::new(id)), rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subwire_core::OperationId;

    fn make_handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(
            ConnectionId::from_raw("conn_1"),
            Dialect::GraphqlTransportWs,
            tx,
        );
        (handle, rx)
    }

    #[tokio::test]
    async fn send_enqueues_in_order() {
        let (handle, mut rx) = make_handle();
        assert!(handle.send(Frame::Ack));
        assert!(handle.send(Frame::Complete {
            id: OperationId::from("1")
        }));
        assert_eq!(rx.recv().await, Some(Outbound::Frame(Frame::Ack)));
        assert!(matches!(
            rx.recv().await,
            Some(Outbound::Frame(Frame::Complete { .. }))
        ));
    }

    #[tokio::test]
    async fn close_is_queued_once_and_blocks_sends() {
        let (handle, mut rx) = make_handle();
        assert!(handle.close(CloseCode::GoingAway, "bye"));
        assert!(!handle.close(CloseCode::PolicyViolation, "again"));
        assert!(!handle.send(Frame::KeepAlive));
        assert_eq!(handle.drop_count(), 1);
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Close {
                code: CloseCode::GoingAway,
                reason: "bye".into()
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_to_gone_writer_counts_drop() {
        let (handle, rx) = make_handle();
        drop(rx);
        assert!(!handle.send(Frame::Ack));
        assert_eq!(handle.drop_count(), 1);
    }

    #[test]
    fn channel_starts_pending() {
        let (state, _rx) = ConnectionState::channel(Dialect::GraphqlWs);
        assert_eq!(state.phase, Phase::Pending);
        assert!(!state.connected);
        assert_eq!(state.context.connection_id, *state.id());
        assert_eq!(state.handle.dialect(), Dialect::GraphqlWs);
    }
}
