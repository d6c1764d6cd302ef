//! Contract between the connection state machine and query execution.

mod streaming;

pub use streaming::StreamingOrchestrator;

use std::sync::Arc;

use async_trait::async_trait;
use subwire_core::{ConnectionId, GraphQLRequest, OperationId};

use crate::connection::ConnectionHandle;
use crate::context::OperationContext;

/// Runs operations on behalf of connections.
///
/// Results go back through the [`ConnectionHandle`] passed to `connect`,
/// tagged with their operation id. The dispatcher issues exactly one
/// `disconnect` for every `connect`; after `stop` or `disconnect` nothing
/// more may be sent for the affected operations.
#[async_trait]
pub trait Orchestrator: Send + Sync + 'static {
    /// A connection completed its handshake.
    async fn connect(&self, connection: Arc<ConnectionHandle>);

    /// A connection is gone; release every operation it owns.
    async fn disconnect(&self, connection_id: &ConnectionId);

    /// Begin a streaming operation.
    async fn start(
        &self,
        connection_id: &ConnectionId,
        operation_id: OperationId,
        request: GraphQLRequest,
        context: Arc<OperationContext>,
    );

    /// Run a one-shot operation.
    async fn once(
        &self,
        connection_id: &ConnectionId,
        operation_id: OperationId,
        request: GraphQLRequest,
        context: Arc<OperationContext>,
    );

    /// Stop an operation. Unknown ids are ignored.
    async fn stop(&self, connection_id: &ConnectionId, operation_id: &OperationId);
}
