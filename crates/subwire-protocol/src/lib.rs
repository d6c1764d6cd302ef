//! # subwire-protocol
//!
//! Wire format of the two supported GraphQL-over-WebSocket sub-protocols.
//!
//! - [`Dialect`]: `graphql-transport-ws` and the legacy `graphql-ws`, plus
//!   negotiation against the client's `Sec-WebSocket-Protocol` offer
//! - [`Command`]: the closed set of inbound commands
//! - [`codec::decode`]: text frame → [`Command`], never failing (errors become
//!   `Fatal`/`Error` commands)
//! - [`Frame`]: outbound frames, encoded per dialect
//! - [`CloseCode`]: socket close codes the server uses

#![deny(unsafe_code)]

pub mod close;
pub mod codec;
pub mod command;
pub mod dialect;
pub mod error;
pub mod frame;

pub use close::CloseCode;
pub use command::Command;
pub use dialect::Dialect;
pub use error::CodecError;
pub use frame::Frame;
