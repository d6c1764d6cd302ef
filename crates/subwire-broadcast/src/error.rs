//! Broadcast error types.

use subwire_core::SubscriberId;
use thiserror::Error;

/// Errors returned by [`Hub`](crate::Hub) registration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The id already has an active registration.
    #[error("subscriber {0} is already registered")]
    AlreadySubscribed(SubscriberId),
    /// The hub has been closed and accepts no new subscribers.
    #[error("hub is closed")]
    Closed,
}

/// Errors at the typed boundary of [`PubSub`](crate::PubSub).
#[derive(Debug, Error)]
pub enum PubSubError {
    /// The payload could not be serialized.
    #[error("failed to encode payload for topic {topic}: {source}")]
    Encode {
        /// Topic the payload was published to.
        topic: String,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
    /// A published payload does not have the shape the subscriber expects.
    #[error("failed to decode payload from topic {topic}: {source}")]
    Decode {
        /// Topic the payload was read from.
        topic: String,
        /// Underlying deserializer error.
        #[source]
        source: serde_json::Error,
    },
}

/// Abnormal end of a [`pipe`](crate::Hub::pipe) task.
#[derive(Debug, Error)]
pub enum PipeError<E> {
    /// The source stream yielded an error.
    #[error("pipe source failed: {0}")]
    Source(E),
    /// The pipe task panicked or was aborted by the runtime.
    #[error("pipe task did not complete")]
    Aborted,
}
