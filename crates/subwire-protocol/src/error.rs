//! Codec errors.

use subwire_core::OperationId;
use thiserror::Error;

use crate::command::Command;

/// Why a text frame could not be decoded into a regular command.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame is not JSON.
    #[error("Invalid message: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Frame is JSON but not an object.
    #[error("Invalid message: expected a JSON object")]
    NotAnObject,

    /// No string `type` discriminator.
    #[error("Invalid message: missing type")]
    MissingType,

    /// An operation message without an id.
    #[error("Invalid message: {kind} requires an id")]
    MissingId {
        /// Message type that needed the id.
        kind: String,
    },

    /// Operation payload has the wrong shape.
    #[error("Invalid payload for operation {id}: {message}")]
    InvalidPayload {
        /// Operation the payload belonged to.
        id: OperationId,
        /// What was wrong with it.
        message: String,
    },
}

impl CodecError {
    /// Whether the error ends the connection rather than one operation.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidPayload { .. })
    }

    /// Fold the error into the command the state machine will see.
    pub fn into_command(self) -> Command {
        match self {
            Self::InvalidPayload { id, message } => Command::Error { id, message },
            other => Command::Fatal {
                message: other.to_string(),
            },
        }
    }
}
