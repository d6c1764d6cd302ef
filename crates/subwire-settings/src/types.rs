//! Settings type definitions.
//!
//! All types use camelCase field names and `#[serde(default)]`, so partial
//! JSON fills in missing fields from [`Default`].

use serde::{Deserialize, Serialize};
use subwire_broadcast::BufferPolicy;
use subwire_protocol::Dialect;
use subwire_telemetry::LogFormat;

use crate::errors::{Result, SettingsError};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubwireSettings {
    /// Listener settings.
    pub server: ServerSettings,
    /// Keep-alive timer.
    pub keep_alive: KeepAliveSettings,
    /// Sub-protocol selection.
    pub protocol: ProtocolSettings,
    /// Topic hub buffering.
    pub hub: HubSettings,
    /// Operation admission.
    pub security: SecuritySettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl SubwireSettings {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.server.path.starts_with('/') {
            return Err(SettingsError::invalid(
                "server.path",
                format!("must start with '/', got {:?}", self.server.path),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::invalid(
                "server.maxConnections",
                "must be at least 1",
            ));
        }
        if self.server.max_message_size < 1024 {
            return Err(SettingsError::invalid(
                "server.maxMessageSize",
                format!(
                    "must be at least 1024 bytes, got {}",
                    self.server.max_message_size
                ),
            ));
        }
        if self.protocol.dialects.is_empty() {
            return Err(SettingsError::invalid(
                "protocol.dialects",
                "must name at least one dialect",
            ));
        }
        if self.hub.buffer == BufferPolicy::Bounded(0) {
            return Err(SettingsError::invalid(
                "hub.buffer",
                "bounded capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port; `0` picks an ephemeral port.
    pub port: u16,
    /// Route of the WebSocket endpoint.
    pub path: String,
    /// Upgrades beyond this many live connections get 503.
    pub max_connections: usize,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            path: "/graphql".to_string(),
            max_connections: 1024,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Keep-alive settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeepAliveSettings {
    /// Interval between keep-alive frames; `0` disables them.
    pub interval_ms: u64,
}

impl Default for KeepAliveSettings {
    fn default() -> Self {
        Self { interval_ms: 12_500 }
    }
}

/// Sub-protocol settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSettings {
    /// Accepted dialects in server preference order.
    pub dialects: Vec<Dialect>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            dialects: Dialect::ALL.to_vec(),
        }
    }
}

/// Hub settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Per-subscriber buffer policy for topic hubs.
    pub buffer: BufferPolicy,
}

/// Security settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecuritySettings {
    /// Admit `__schema`/`__type` queries.
    pub allow_introspection: bool,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            allow_introspection: true,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`); `RUST_LOG` wins.
    pub level: String,
    /// Stdout format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(SubwireSettings::default()).unwrap();
        assert_eq!(value["server"]["maxConnections"], 1024);
        assert_eq!(value["keepAlive"]["intervalMs"], 12_500);
        assert_eq!(value["security"]["allowIntrospection"], true);
        assert_eq!(value["hub"]["buffer"], "unbounded");
        assert_eq!(
            value["protocol"]["dialects"],
            json!(["graphql-transport-ws", "graphql-ws"])
        );
        assert_eq!(value["logging"]["format"], "pretty");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: SubwireSettings = serde_json::from_value(json!({
            "server": {"port": 9000},
            "hub": {"buffer": {"bounded": 8}}
        }))
        .unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.hub.buffer, BufferPolicy::Bounded(8));
        assert_eq!(settings.keep_alive.interval_ms, 12_500);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut settings = SubwireSettings::default();
        settings.server.path = "graphql".into();
        let err = settings.validate().unwrap_err();
        assert_eq!(err.field(), Some("server.path"));

        let mut settings = SubwireSettings::default();
        settings.protocol.dialects.clear();
        assert_eq!(
            settings.validate().unwrap_err().field(),
            Some("protocol.dialects")
        );

        let mut settings = SubwireSettings::default();
        settings.hub.buffer = BufferPolicy::Bounded(0);
        assert!(settings.validate().is_err());

        let mut settings = SubwireSettings::default();
        settings.server.max_connections = 0;
        assert!(settings.validate().is_err());
    }
}
