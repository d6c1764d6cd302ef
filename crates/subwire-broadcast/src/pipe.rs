//! Attach an external producer to a hub.

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PipeError;
use crate::hub::Hub;

/// How a pipe task ended when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipeExit {
    /// The source ran out of elements.
    Exhausted,
    /// [`PipeHandle::cancel`] was called.
    Cancelled,
}

/// Handle to a running pipe task.
pub struct PipeHandle<E> {
    cancel: CancellationToken,
    task: JoinHandle<Result<PipeExit, E>>,
}

impl<E> PipeHandle<E> {
    /// Stop consuming the source. Checked between elements.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the pipe task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the pipe task to end.
    pub async fn join(self) -> Result<PipeExit, PipeError<E>> {
        match self.task.await {
            Ok(Ok(exit)) => Ok(exit),
            Ok(Err(e)) => Err(PipeError::Source(e)),
            Err(_) => Err(PipeError::Aborted),
        }
    }
}

/// Closes the hub when the pipe task ends, including by panic or abort.
struct CloseOnExit<T: Clone + Send + 'static>(Hub<T>);

impl<T: Clone + Send + 'static> Drop for CloseOnExit<T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

pub(crate) fn spawn<T, S, E>(hub: Hub<T>, source: S) -> PipeHandle<E>
where
    T: Clone + Send + 'static,
    S: Stream<Item = Result<T, E>> + Send + 'static,
    E: Send + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let guard = CloseOnExit(hub);
        let mut source = Box::pin(source);
        let mut forwarded = 0usize;
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(forwarded, "pipe cancelled");
                    return Ok(PipeExit::Cancelled);
                }
                next = source.next() => match next {
                    Some(Ok(value)) => {
                        let _ = guard.0.publish(value);
                        forwarded += 1;
                    }
                    Some(Err(e)) => {
                        warn!(forwarded, "pipe source failed");
                        return Err(e);
                    }
                    None => {
                        debug!(forwarded, "pipe source exhausted");
                        return Ok(PipeExit::Exhausted);
                    }
                },
            }
        }
    });
    PipeHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[tokio::test]
    async fn republishes_and_closes_on_exhaustion() {
        let hub = Hub::new();
        let ds = hub.downstream();
        let handle = hub.pipe(stream::iter(vec![Ok::<_, String>(1), Ok(2), Ok(3)]));
        let received: Vec<i32> = ds.collect().await;
        assert_eq!(received, vec![1, 2, 3]);
        assert_eq!(handle.join().await.unwrap(), PipeExit::Exhausted);
        assert!(hub.is_closed());
    }

    #[tokio::test]
    async fn source_failure_still_closes_hub() {
        let hub = Hub::new();
        let ds = hub.downstream();
        let handle = hub.pipe(stream::iter(vec![Ok(1), Err("broken".to_string()), Ok(3)]));
        let received: Vec<i32> = ds.collect().await;
        assert_eq!(received, vec![1]);
        match handle.join().await {
            Err(PipeError::Source(msg)) => assert_eq!(msg, "broken"),
            other => panic!("unexpected pipe result: {other:?}"),
        }
        assert!(hub.is_closed());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn cancel_stops_consumption_and_closes() {
        let hub = Hub::<u32>::new();
        let mut ds = hub.downstream();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<u32, String>>();
        let handle = hub.pipe(UnboundedReceiverStream::new(rx));

        tx.send(Ok(1)).unwrap();
        assert_eq!(ds.next().await, Some(1));

        handle.cancel();
        assert_eq!(ds.next().await, None);
        assert_eq!(handle.join().await.unwrap(), PipeExit::Cancelled);
        // The source is no longer polled.
        assert!(tx.send(Ok(2)).is_err());
    }
}
