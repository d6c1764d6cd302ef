//! Topic-keyed registry of hubs with typed JSON encoding.
//!
//! Publishing to a topic that has no hub creates one (create-on-publish); the
//! value reaches nobody until someone subscribes, and no history is kept.

use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use dashmap::DashMap;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::consumer::BufferPolicy;
use crate::downstream::Downstream;
use crate::error::PubSubError;
use crate::hub::Hub;

/// In-process publish/subscribe over named topics.
pub struct PubSub {
    topics: DashMap<String, Hub<Bytes>>,
    policy: BufferPolicy,
}

impl PubSub {
    /// Registry whose hubs use unbounded buffers.
    pub fn new() -> Self {
        Self::with_policy(BufferPolicy::Unbounded)
    }

    /// Registry whose hubs use `policy`.
    pub fn with_policy(policy: BufferPolicy) -> Self {
        Self {
            topics: DashMap::new(),
            policy,
        }
    }

    fn hub(&self, topic: &str) -> Hub<Bytes> {
        if let Some(hub) = self.topics.get(topic) {
            return hub.clone();
        }
        self.topics
            .entry(topic.to_owned())
            .or_insert_with(|| {
                debug!(topic, "topic created");
                Hub::with_policy(self.policy)
            })
            .clone()
    }

    /// Subscribe to `topic`, decoding every payload as `T`.
    pub fn async_stream<T: DeserializeOwned>(&self, topic: &str) -> TopicStream<T> {
        TopicStream {
            topic: Arc::from(topic),
            inner: self.hub(topic).downstream(),
            _marker: PhantomData,
        }
    }

    /// Encode `payload` as JSON and publish it on `topic`.
    ///
    /// Returns how many subscribers received it.
    pub fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
    ) -> Result<usize, PubSubError> {
        let encoded = serde_json::to_vec(payload).map_err(|source| PubSubError::Encode {
            topic: topic.to_owned(),
            source,
        })?;
        let delivered = self.hub(topic).publish(Bytes::from(encoded));
        trace!(topic, delivered, "published to topic");
        Ok(delivered)
    }

    /// Close and forget `topic`. Returns whether it existed.
    pub fn close(&self, topic: &str) -> bool {
        match self.topics.remove(topic) {
            Some((_, hub)) => {
                hub.close();
                debug!(topic, "topic closed");
                true
            }
            None => false,
        }
    }

    /// Whether `topic` currently has a hub.
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Names of all topics with a hub.
    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }

    /// Subscribers currently registered on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |hub| hub.subscriber_count())
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed subscriber stream for one topic.
///
/// Items that do not decode as `T` surface as [`PubSubError::Decode`]; the
/// stream keeps going afterwards.
pub struct TopicStream<T> {
    topic: Arc<str>,
    inner: Downstream<Bytes>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TopicStream<T> {
    /// Topic this stream reads from.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Unsubscribe; the stream ends.
    pub fn cancel(&mut self) {
        self.inner.cancel();
    }

    /// Run `hook` once when the underlying registration terminates.
    #[must_use]
    pub fn on_terminate(self, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            topic: self.topic,
            inner: self.inner.on_terminate(hook),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Stream for TopicStream<T> {
    type Item = Result<T, PubSubError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(bytes)) => Poll::Ready(Some(serde_json::from_slice(&bytes).map_err(
                |source| PubSubError::Decode {
                    topic: this.topic.to_string(),
                    source,
                },
            ))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Message {
        id: u32,
        body: String,
    }

    #[tokio::test]
    async fn publish_then_read_roundtrips() {
        let pubsub = PubSub::new();
        let mut stream = pubsub.async_stream::<Message>("chat");
        let sent = Message {
            id: 1,
            body: "hi".into(),
        };
        assert_eq!(pubsub.publish("chat", &sent).unwrap(), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), sent);
    }

    #[test]
    fn publish_creates_missing_topic() {
        let pubsub = PubSub::new();
        assert!(!pubsub.has_topic("fresh"));
        assert_eq!(pubsub.publish("fresh", &1).unwrap(), 0);
        assert!(pubsub.has_topic("fresh"));
        assert_eq!(pubsub.topics(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn publish_before_subscribe_is_not_replayed() {
        let pubsub = PubSub::new();
        let _ = pubsub.publish("t", &"early").unwrap();
        let mut stream = pubsub.async_stream::<String>("t");
        let _ = pubsub.publish("t", &"late").unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn decode_mismatch_is_returned_to_subscriber() {
        let pubsub = PubSub::new();
        let mut typed = pubsub.async_stream::<Message>("mixed");
        let _ = pubsub.publish("mixed", &"not a message").unwrap();
        let _ = pubsub
            .publish(
                "mixed",
                &Message {
                    id: 2,
                    body: "ok".into(),
                },
            )
            .unwrap();
        assert!(matches!(
            typed.next().await,
            Some(Err(PubSubError::Decode { ref topic, .. })) if topic == "mixed"
        ));
        assert_eq!(typed.next().await.unwrap().unwrap().id, 2);
    }

    #[tokio::test]
    async fn close_ends_streams_and_forgets_topic() {
        let pubsub = PubSub::new();
        let mut stream = pubsub.async_stream::<u32>("t");
        assert!(pubsub.close("t"));
        assert!(stream.next().await.is_none());
        assert!(!pubsub.has_topic("t"));
        assert!(!pubsub.close("t"));
    }

    #[tokio::test]
    async fn reopened_topic_gets_fresh_hub() {
        let pubsub = PubSub::new();
        let mut old = pubsub.async_stream::<u32>("t");
        assert!(pubsub.close("t"));
        let mut fresh = pubsub.async_stream::<u32>("t");
        assert_eq!(pubsub.publish("t", &5).unwrap(), 1);
        assert_eq!(fresh.next().await.unwrap().unwrap(), 5);
        assert!(old.next().await.is_none());
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let pubsub = PubSub::new();
        let mut a = pubsub.async_stream::<u32>("a");
        let mut b = pubsub.async_stream::<u32>("b");
        let _ = pubsub.publish("a", &1).unwrap();
        let _ = pubsub.publish("b", &2).unwrap();
        assert_eq!(a.next().await.unwrap().unwrap(), 1);
        assert_eq!(b.next().await.unwrap().unwrap(), 2);
        assert!(pubsub.close("a"));
        let _ = pubsub.publish("b", &3).unwrap();
        assert_eq!(b.next().await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let pubsub = PubSub::new();
        let stream = pubsub.async_stream::<u32>("t");
        assert_eq!(pubsub.subscriber_count("t"), 1);
        drop(stream);
        assert_eq!(pubsub.subscriber_count("t"), 0);
    }

    #[test]
    fn encode_failure_is_reported() {
        use std::collections::HashMap;
        let pubsub = PubSub::new();
        let mut bad = HashMap::new();
        let _ = bad.insert(vec![1u8], 1u8);
        let err = pubsub.publish("t", &bad).unwrap_err();
        assert!(matches!(err, PubSubError::Encode { .. }));
    }
}
