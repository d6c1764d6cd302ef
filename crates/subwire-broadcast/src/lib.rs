//! # subwire-broadcast
//!
//! One producer, many independent consumers.
//!
//! - [`Hub`]: a mutex-linearized registry of subscriber id → consumer. Every
//!   `publish` reaches exactly the subscribers registered at that instant, in
//!   call order per subscriber.
//! - [`Downstream`]: a subscriber-facing `Stream` bound to one registration;
//!   dropping, cancelling or exhausting it unsubscribes exactly once.
//! - [`Hub::pipe`]: republishes an external `Stream` and closes the hub on
//!   every exit path.
//! - [`PubSub`]: topic name → hub, with JSON encoding at the boundary.

#![deny(unsafe_code)]

pub mod consumer;
pub mod downstream;
pub mod error;
pub mod hub;
pub mod pipe;
pub mod pubsub;

pub use consumer::{BufferPolicy, Consumer};
pub use downstream::Downstream;
pub use error::{HubError, PipeError, PubSubError};
pub use hub::Hub;
pub use pipe::{PipeExit, PipeHandle};
pub use pubsub::{PubSub, TopicStream};
