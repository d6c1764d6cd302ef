//! Operation admission predicate.

use std::sync::Arc;

use subwire_core::{document, GraphQLRequest};

/// Decides whether a request may run. `Err` carries the message sent back
/// to the client as a per-operation error.
pub type IntrospectionGuard = Arc<dyn Fn(&GraphQLRequest) -> Result<(), String> + Send + Sync>;

const INTROSPECTION_FIELDS: &[&str] = &["__schema", "__type"];

/// Guard that admits every request.
pub fn allow_all() -> IntrospectionGuard {
    Arc::new(|_| Ok(()))
}

/// Guard that rejects requests selecting `__schema` or `__type`.
pub fn deny_introspection() -> IntrospectionGuard {
    Arc::new(|request| {
        if document::selects_any(&request.query, INTROSPECTION_FIELDS) {
            Err("GraphQL introspection is not allowed, but the query contained __schema or __type"
                .to_string())
        } else {
            Ok(())
        }
    })
}

/// Pick the guard for a config flag.
pub fn for_config(allow_introspection: bool) -> IntrospectionGuard {
    if allow_introspection {
        allow_all()
    } else {
        deny_introspection()
    }
}
