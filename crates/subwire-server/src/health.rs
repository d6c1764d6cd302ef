//! `/health` body.

use std::time::Instant;

use serde::Serialize;

use crate::config::ServerConfig;

/// Whether new connections are being admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting upgrades.
    Ok,
    /// Shutdown started; live sessions are being closed.
    Draining,
}

/// Snapshot reported by `GET /health`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Admission state.
    pub status: HealthStatus,
    /// Whole seconds since the server was created.
    pub uptime_secs: u64,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Connection limit.
    pub max_connections: usize,
    /// Sub-protocols offered at upgrade, in preference order.
    pub dialects: Vec<&'static str>,
}

impl HealthResponse {
    /// Build the snapshot for `config`.
    pub fn snapshot(
        config: &ServerConfig,
        started: Instant,
        connections: usize,
        draining: bool,
    ) -> Self {
        Self {
            status: if draining {
                HealthStatus::Draining
            } else {
                HealthStatus::Ok
            },
            uptime_secs: started.elapsed().as_secs(),
            connections,
            max_connections: config.max_connections,
            dialects: config.dialects.iter().map(|d| d.protocol()).collect(),
        }
    }
}
