//! Per-subscriber buffers.

use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Buffering applied between a hub and one subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BufferPolicy {
    /// Never blocks or drops; memory grows with a slow subscriber.
    #[default]
    Unbounded,
    /// Holds at most `n` values; further values are dropped (drop-newest).
    Bounded(usize),
}

/// Outcome of offering one value to a consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The value was enqueued.
    Delivered,
    /// The buffer was full and the value was discarded.
    Dropped,
    /// The receiving side is gone.
    Gone,
}

/// Producer side of one subscriber's buffer.
///
/// `yield` is [`Consumer::offer`]; `finish` is dropping the consumer, which
/// ends the paired [`Receiver`] once its buffer drains.
#[derive(Debug)]
pub struct Consumer<T> {
    tx: Sender<T>,
}

#[derive(Debug)]
enum Sender<T> {
    Unbounded(mpsc::UnboundedSender<T>),
    Bounded(mpsc::Sender<T>),
}

/// Receiving side of one subscriber's buffer.
#[derive(Debug)]
pub enum Receiver<T> {
    /// Paired with [`BufferPolicy::Unbounded`].
    Unbounded(mpsc::UnboundedReceiver<T>),
    /// Paired with [`BufferPolicy::Bounded`].
    Bounded(mpsc::Receiver<T>),
}

impl<T> Consumer<T> {
    /// Create a consumer and its receiver with the given policy.
    pub fn channel(policy: BufferPolicy) -> (Self, Receiver<T>) {
        match policy {
            BufferPolicy::Unbounded => {
                let (tx, rx) = mpsc::unbounded_channel();
                (
                    Self {
                        tx: Sender::Unbounded(tx),
                    },
                    Receiver::Unbounded(rx),
                )
            }
            BufferPolicy::Bounded(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                (
                    Self {
                        tx: Sender::Bounded(tx),
                    },
                    Receiver::Bounded(rx),
                )
            }
        }
    }

    /// Offer a value without waiting.
    pub fn offer(&self, value: T) -> Delivery {
        match &self.tx {
            Sender::Unbounded(tx) => match tx.send(value) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Gone,
            },
            Sender::Bounded(tx) => match tx.try_send(value) {
                Ok(()) => Delivery::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
                Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Gone,
            },
        }
    }

    /// Whether the receiving side has been dropped or closed.
    pub fn is_gone(&self) -> bool {
        match &self.tx {
            Sender::Unbounded(tx) => tx.is_closed(),
            Sender::Bounded(tx) => tx.is_closed(),
        }
    }
}

impl<T> Receiver<T> {
    /// Poll for the next buffered value; `None` once finished and drained.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self {
            Self::Unbounded(rx) => rx.poll_recv(cx),
            Self::Bounded(rx) => rx.poll_recv(cx),
        }
    }

    /// Receive the next value.
    pub async fn recv(&mut self) -> Option<T> {
        match self {
            Self::Unbounded(rx) => rx.recv().await,
            Self::Bounded(rx) => rx.recv().await,
        }
    }

    /// Take a buffered value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        match self {
            Self::Unbounded(rx) => rx.try_recv().ok(),
            Self::Bounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Stop accepting values; already buffered values remain readable.
    pub fn close(&mut self) {
        match self {
            Self::Unbounded(rx) => rx.close(),
            Self::Bounded(rx) => rx.close(),
        }
    }
}
