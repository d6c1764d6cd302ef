//! Broadcast hub: one publisher, a dynamic set of subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::Stream;
use parking_lot::Mutex;
use subwire_core::SubscriberId;
use tracing::{debug, trace, warn};

use crate::consumer::{BufferPolicy, Consumer, Delivery};
use crate::downstream::Downstream;
use crate::error::HubError;
use crate::pipe::{self, PipeHandle};

/// Concurrency-safe one-to-many channel.
///
/// All operations take the same lock, so subscribe, unsubscribe, publish and
/// close are linearized. `publish` only enqueues into per-subscriber buffers
/// while holding it and never waits on a consumer.
pub struct Hub<T> {
    pub(crate) inner: Arc<Inner<T>>,
}

pub(crate) struct Inner<T> {
    state: Mutex<State<T>>,
    policy: BufferPolicy,
    dropped: AtomicU64,
}

struct State<T> {
    subscribers: HashMap<SubscriberId, Consumer<T>>,
    closed: bool,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Inner<T> {
    pub(crate) fn remove(&self, id: &SubscriberId) -> bool {
        let removed = self.state.lock().subscribers.remove(id).is_some();
        if removed {
            debug!(subscriber_id = %id, "subscriber removed");
        }
        removed
    }
}

impl<T: Clone + Send + 'static> Hub<T> {
    /// Hub with unbounded per-subscriber buffers.
    pub fn new() -> Self {
        Self::with_policy(BufferPolicy::Unbounded)
    }

    /// Hub whose downstreams use `policy`.
    pub fn with_policy(policy: BufferPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    subscribers: HashMap::new(),
                    closed: false,
                }),
                policy,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register `consumer` under `id`.
    ///
    /// An id that is already registered is rejected; the existing registration
    /// is left untouched.
    pub fn subscribe(&self, id: SubscriberId, consumer: Consumer<T>) -> Result<(), HubError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(HubError::Closed);
        }
        if state.subscribers.contains_key(&id) {
            return Err(HubError::AlreadySubscribed(id));
        }
        debug!(subscriber_id = %id, "subscriber registered");
        let _ = state.subscribers.insert(id, consumer);
        Ok(())
    }

    /// Remove `id` if present. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: &SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Deliver `value` to every subscriber registered right now.
    ///
    /// Returns the number of subscribers the value was enqueued for.
    /// Subscribers whose receiving side is gone are pruned.
    pub fn publish(&self, value: T) -> usize {
        let mut state = self.inner.state.lock();
        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, consumer) in &state.subscribers {
            match consumer.offer(value.clone()) {
                Delivery::Delivered => delivered += 1,
                Delivery::Dropped => {
                    let _ = self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(subscriber_id = %id, "subscriber buffer full, dropping value");
                }
                Delivery::Gone => gone.push(id.clone()),
            }
        }
        for id in gone {
            let _ = state.subscribers.remove(&id);
            debug!(subscriber_id = %id, "pruned subscriber with closed receiver");
        }
        trace!(delivered, "published value");
        delivered
    }

    /// Finish every subscriber and empty the registry. Idempotent.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.subscribers.drain().collect()
        };
        debug!(finished = drained.len(), "hub closed");
        drop(drained);
    }

    /// Allocate a new subscriber and return its stream.
    ///
    /// Registration completes before this returns, so every later `publish`
    /// reaches the new subscriber. On a closed hub the stream ends
    /// immediately.
    pub fn downstream(&self) -> Downstream<T> {
        let id = SubscriberId::new();
        let (consumer, receiver) = Consumer::channel(self.inner.policy);
        match self.subscribe(id.clone(), consumer) {
            Ok(()) => {}
            Err(HubError::Closed) => debug!(subscriber_id = %id, "downstream on closed hub"),
            Err(HubError::AlreadySubscribed(_)) => {
                warn!(subscriber_id = %id, "generated subscriber id collided");
            }
        }
        Downstream::new(id, receiver, Arc::downgrade(&self.inner))
    }

    /// Republish every element of `source` on this hub.
    ///
    /// Spawns one task. The hub is closed when that task ends, whether the
    /// source was exhausted, failed, or the handle was cancelled.
    pub fn pipe<S, E>(&self, source: S) -> PipeHandle<E>
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Send + 'static,
    {
        pipe::spawn(self.clone(), source)
    }

    /// Number of active registrations.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    /// Whether `id` is currently registered.
    pub fn is_subscribed(&self, id: &SubscriberId) -> bool {
        self.inner.state.lock().subscribers.contains_key(id)
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Values discarded because a bounded buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Clone + Send + 'static> Default for Hub<T> {
    fn default() -> Self {
        Self::new()
    }
}
