//! # subwire-core
//!
//! Shared vocabulary for the subwire crates:
//!
//! - **Branded IDs**: `ConnectionId`, `OperationId`, `SubscriberId`
//! - **GraphQL wire types**: request, result and error payloads carried inside
//!   protocol frames
//! - **Document scanning**: lexical inspection of a query document (operation
//!   kind, root fields, introspection fields) without a full parser

#![deny(unsafe_code)]

pub mod document;
pub mod graphql;
pub mod ids;

pub use document::{OperationKind, OperationSummary};
pub use graphql::{GraphQLError, GraphQLRequest, GraphQLResult};
pub use ids::{ConnectionId, OperationId, SubscriberId};
