//! Server configuration.

use std::time::Duration;

use subwire_protocol::Dialect;
use subwire_settings::SubwireSettings;

/// Configuration for the subwire server.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Route of the WebSocket endpoint.
    pub path: String,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Keep-alive interval; `None` disables the timer.
    pub keep_alive: Option<Duration>,
    /// Accepted dialects in preference order.
    pub dialects: Vec<Dialect>,
    /// Admit introspection queries.
    pub allow_introspection: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&SubwireSettings::default())
    }
}

impl ServerConfig {
    /// Derive from loaded settings.
    pub fn from_settings(settings: &SubwireSettings) -> Self {
        let interval = settings.keep_alive.interval_ms;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            path: settings.server.path.clone(),
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            keep_alive: (interval > 0).then(|| Duration::from_millis(interval)),
            dialects: settings.protocol.dialects.clone(),
            allow_introspection: settings.security.allow_introspection,
        }
    }
}
