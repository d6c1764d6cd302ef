//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// The settings file is not JSON, or a field has the wrong shape.
    #[error("malformed settings in {}: {source}", path.display())]
    Malformed {
        /// File the bad value came from.
        path: PathBuf,
        /// Parser error, with line and column.
        source: serde_json::Error,
    },

    /// The compiled defaults did not serialize.
    #[error("cannot encode default settings: {0}")]
    Defaults(#[from] serde_json::Error),

    /// A value parsed but is out of range.
    #[error("{field}: {message}")]
    Invalid {
        /// Dotted camelCase path of the field, e.g. `server.path`.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }

    /// The offending field, for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
