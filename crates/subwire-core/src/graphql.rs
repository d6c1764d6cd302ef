//! GraphQL payloads carried inside protocol frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{self, OperationKind, OperationSummary};

/// A GraphQL operation request as sent in a `subscribe`/`start` payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    /// Query document text.
    pub query: String,
    /// Operation to run when the document holds more than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    /// Variable values, usually an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
    /// Free-form extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLRequest {
    /// Build a request with only a query document.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
            extensions: None,
        }
    }

    /// Attach variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Select an operation by name.
    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Lexical summary of the selected operation.
    pub fn summary(&self) -> Option<OperationSummary> {
        document::summarize(&self.query, self.operation_name.as_deref())
    }

    /// Kind of the selected operation, if one can be found.
    pub fn operation_kind(&self) -> Option<OperationKind> {
        self.summary().map(|s| s.kind)
    }

    /// Look up a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.as_ref()?.get(name)
    }
}

/// A GraphQL error as serialized on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human-readable message.
    pub message: String,
    /// Response path the error is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    /// Structured extensions (error codes and the like).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}

impl From<String> for GraphQLError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for GraphQLError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result of executing (or one event of) an operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResult {
    /// Result data; `null` when execution failed before producing any.
    #[serde(default)]
    pub data: Option<Value>,
    /// Field or request errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl GraphQLResult {
    /// A successful result.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// A failed result without data.
    pub fn errors(errors: Vec<GraphQLError>) -> Self {
        Self { data: None, errors }
    }
}
