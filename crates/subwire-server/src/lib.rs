//! # subwire-server
//!
//! WebSocket server for GraphQL subscriptions.
//!
//! Each socket runs a [`session`] that decodes frames into commands and feeds
//! them to the [`Dispatcher`] state machine. Operations are handed to an
//! [`Orchestrator`]; [`StreamingOrchestrator`] runs them on an [`Executor`],
//! and [`TopicExecutor`] backs subscriptions with topic hubs.

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod guard;
pub mod health;
pub mod keepalive;
pub mod orchestrator;
pub mod server;
pub mod session;
pub mod shutdown;

pub use config::ServerConfig;
pub use connection::{ConnectionHandle, ConnectionState, Outbound, Phase};
pub use context::OperationContext;
pub use dispatcher::{Dispatcher, Flow};
pub use error::ServerError;
pub use health::{HealthResponse, HealthStatus};
pub use executor::{Executor, TopicExecutor};
pub use guard::{allow_all, deny_introspection, IntrospectionGuard};
pub use orchestrator::{Orchestrator, StreamingOrchestrator};
pub use server::{ServerHandle, SubwireServer};
pub use shutdown::ShutdownCoordinator;
