//! Subscriber-facing stream bound to one hub registration.

use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::Stream;
use subwire_core::SubscriberId;

use crate::consumer::Receiver;
use crate::hub::Inner;

type TerminateHook = Box<dyn FnOnce() + Send>;

/// A cancellable stream of the values a hub publishes to one subscriber.
///
/// The stream terminates when the hub finishes it, when [`cancel`] is
/// called, or when it is dropped. Termination unsubscribes from the hub and
/// runs the [`on_terminate`] hooks exactly once.
///
/// [`cancel`]: Downstream::cancel
/// [`on_terminate`]: Downstream::on_terminate
pub struct Downstream<T> {
    id: SubscriberId,
    receiver: Receiver<T>,
    registration: Option<Registration<T>>,
}

struct Registration<T> {
    id: SubscriberId,
    hub: Weak<Inner<T>>,
    hooks: Vec<TerminateHook>,
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            let _ = inner.remove(&self.id);
        }
        for hook in self.hooks.drain(..) {
            hook();
        }
    }
}

impl<T> Downstream<T> {
    pub(crate) fn new(id: SubscriberId, receiver: Receiver<T>, hub: Weak<Inner<T>>) -> Self {
        Self {
            registration: Some(Registration {
                id: id.clone(),
                hub,
                hooks: Vec::new(),
            }),
            id,
            receiver,
        }
    }

    /// Subscriber id of this registration.
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Run `hook` once when this downstream terminates.
    ///
    /// If it has already terminated the hook runs immediately.
    #[must_use]
    pub fn on_terminate(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        match self.registration.as_mut() {
            Some(registration) => registration.hooks.push(Box::new(hook)),
            None => hook(),
        }
        self
    }

    /// Stop receiving and unsubscribe. Later polls yield `None`.
    pub fn cancel(&mut self) {
        self.terminate();
    }

    /// Whether termination has already happened.
    pub fn is_terminated(&self) -> bool {
        self.registration.is_none()
    }

    fn terminate(&mut self) {
        if let Some(registration) = self.registration.take() {
            self.receiver.close();
            drop(registration);
        }
    }
}

impl<T> Stream for Downstream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.registration.is_none() {
            return Poll::Ready(None);
        }
        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(value)) => Poll::Ready(Some(value)),
            Poll::Ready(None) => {
                this.terminate();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use futures::StreamExt;

    use crate::hub::Hub;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&count);
        (count, move || {
            let _ = hook_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn drop_unsubscribes_once() {
        let hub = Hub::<u8>::new();
        let (count, hook) = counter();
        let ds = hub.downstream().on_terminate(hook);
        assert_eq!(hub.subscriber_count(), 1);
        drop(ds);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_then_drop_unsubscribes_once() {
        let hub = Hub::<u8>::new();
        let (count, hook) = counter();
        let mut ds = hub.downstream().on_terminate(hook);
        ds.cancel();
        ds.cancel();
        assert!(ds.is_terminated());
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(ds.next().await, None);
        drop(ds);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hub_close_terminates_once() {
        let hub = Hub::<u8>::new();
        let (count, hook) = counter();
        let mut ds = hub.downstream().on_terminate(hook);
        let _ = hub.publish(9);
        hub.close();
        assert_eq!(ds.next().await, Some(9));
        assert_eq!(ds.next().await, None);
        assert_eq!(ds.next().await, None);
        drop(ds);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hook_after_termination_runs_immediately() {
        let hub = Hub::<u8>::new();
        let mut ds = hub.downstream();
        ds.cancel();
        let (count, hook) = counter();
        let _ds = ds.on_terminate(hook);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_downstream_misses_later_publishes() {
        let hub = Hub::new();
        let mut ds = hub.downstream();
        let _ = hub.publish(1);
        ds.cancel();
        assert_eq!(hub.publish(2), 0);
        assert_eq!(ds.next().await, None);
    }

    #[tokio::test]
    async fn outliving_the_hub_is_safe() {
        let hub = Hub::<u8>::new();
        let ds = hub.downstream();
        drop(hub);
        drop(ds);
    }
}
