//! Supported sub-protocols and negotiation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A GraphQL-over-WebSocket sub-protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// The `graphql-ws` library protocol.
    #[serde(rename = "graphql-transport-ws")]
    GraphqlTransportWs,
    /// The legacy `subscriptions-transport-ws` protocol.
    #[serde(rename = "graphql-ws")]
    GraphqlWs,
}

impl Dialect {
    /// All dialects in default preference order.
    pub const ALL: [Dialect; 2] = [Dialect::GraphqlTransportWs, Dialect::GraphqlWs];

    /// Protocol name as offered in `Sec-WebSocket-Protocol`.
    pub fn protocol(self) -> &'static str {
        match self {
            Self::GraphqlTransportWs => "graphql-transport-ws",
            Self::GraphqlWs => "graphql-ws",
        }
    }

    /// Look up a dialect by protocol name.
    pub fn from_protocol(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.protocol() == name.trim())
    }

    /// Pick the first dialect in `supported` that the client offered.
    ///
    /// `offered` is the raw header value: a comma-separated list. Returns
    /// `None` when nothing matches, which rejects the upgrade.
    pub fn negotiate(offered: &str, supported: &[Dialect]) -> Option<Self> {
        let offered: Vec<&str> = offered.split(',').map(str::trim).collect();
        supported
            .iter()
            .copied()
            .find(|d| offered.contains(&d.protocol()))
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol())
    }
}
