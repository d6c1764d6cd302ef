//! Inbound commands.

use serde_json::Value;
use subwire_core::{GraphQLRequest, OperationId};

/// One decoded client message.
///
/// Both dialects decode into this closed set; the connection state machine
/// never sees dialect-specific message names.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Handshake, with the client's connection parameters.
    Initial {
        /// `connection_init` payload, if any.
        payload: Option<Value>,
    },
    /// Client-initiated ping; answered with a pong.
    Ping,
    /// Client asks to end the connection.
    Terminate,
    /// Begin a streaming (subscription) operation.
    Start {
        /// Client-chosen operation id.
        id: OperationId,
        /// The GraphQL request.
        request: GraphQLRequest,
    },
    /// Run a one-shot (query or mutation) operation.
    Once {
        /// Client-chosen operation id.
        id: OperationId,
        /// The GraphQL request.
        request: GraphQLRequest,
    },
    /// Stop an operation.
    Stop {
        /// Operation to stop.
        id: OperationId,
    },
    /// Report an error scoped to one operation; the connection stays open.
    Error {
        /// Operation the error belongs to.
        id: OperationId,
        /// Error message.
        message: String,
    },
    /// Connection-fatal protocol error.
    Fatal {
        /// Reason sent to the client before closing.
        message: String,
    },
    /// Recognized but meaningless here (unknown type, client pong).
    Ignore,
}

impl Command {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initial { .. } => "initial",
            Self::Ping => "ping",
            Self::Terminate => "terminate",
            Self::Start { .. } => "start",
            Self::Once { .. } => "once",
            Self::Stop { .. } => "stop",
            Self::Error { .. } => "error",
            Self::Fatal { .. } => "fatal",
            Self::Ignore => "ignore",
        }
    }

    /// Operation id the command refers to, if any.
    pub fn operation_id(&self) -> Option<&OperationId> {
        match self {
            Self::Start { id, .. }
            | Self::Once { id, .. }
            | Self::Stop { id }
            | Self::Error { id, .. } => Some(id),
            _ => None,
        }
    }
}
