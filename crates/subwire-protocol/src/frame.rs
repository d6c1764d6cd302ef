//! Outbound frames.

use serde_json::{json, Value};
use subwire_core::{GraphQLError, GraphQLResult, OperationId};

use crate::dialect::Dialect;

/// One server message, independent of dialect.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Handshake accepted.
    Ack,
    /// Periodic keep-alive.
    KeepAlive,
    /// Reply to a client ping.
    Pong,
    /// One result of an operation.
    Next {
        /// Operation the result belongs to.
        id: OperationId,
        /// Execution result.
        payload: GraphQLResult,
    },
    /// Operation failed; no further frames follow for `id`.
    Error {
        /// Failed operation.
        id: OperationId,
        /// Errors reported to the client.
        errors: Vec<GraphQLError>,
    },
    /// Operation finished.
    Complete {
        /// Finished operation.
        id: OperationId,
    },
    /// Connection-level error, sent before closing.
    ConnectionError {
        /// Human-readable reason.
        message: String,
    },
}

impl Frame {
    /// Frame name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::KeepAlive => "keep_alive",
            Self::Pong => "pong",
            Self::Next { .. } => "next",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
            Self::ConnectionError { .. } => "connection_error",
        }
    }

    /// Encode as a text frame in `dialect`.
    pub fn encode(&self, dialect: Dialect) -> String {
        let legacy = dialect == Dialect::GraphqlWs;
        let value = match self {
            Self::Ack => json!({"type": "connection_ack"}),
            Self::KeepAlive | Self::Pong if legacy => json!({"type": "ka"}),
            Self::KeepAlive | Self::Pong => json!({"type": "pong"}),
            Self::Next { id, payload } => {
                let kind = if legacy { "data" } else { "next" };
                json!({"type": kind, "id": id, "payload": to_value(payload)})
            }
            Self::Error { id, errors } => json!({
                "type": "error",
                "id": id,
                "payload": to_value(errors),
            }),
            Self::Complete { id } => json!({"type": "complete", "id": id}),
            Self::ConnectionError { message } if legacy => json!({
                "type": "connection_error",
                "payload": {"message": message},
            }),
            Self::ConnectionError { message } => json!({
                "type": "error",
                "payload": [{"message": message}],
            }),
        };
        value.to_string()
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}
