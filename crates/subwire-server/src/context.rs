//! Per-connection context handed to every operation.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use subwire_core::ConnectionId;

/// What an operation knows about the connection that started it.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContext {
    /// Owning connection.
    pub connection_id: ConnectionId,
    /// Upgrade request headers, names lowercased.
    pub headers: BTreeMap<String, String>,
    /// Payload of the client's `connection_init`.
    pub init_payload: Option<Value>,
}

impl OperationContext {
    /// Context with no headers and no init payload.
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            headers: BTreeMap::new(),
            init_payload: None,
        }
    }

    /// Attach upgrade headers.
    #[must_use]
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}
