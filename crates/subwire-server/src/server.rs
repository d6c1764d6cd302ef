//! `SubwireServer`: Axum HTTP + WebSocket server.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::header::SEC_WEBSOCKET_PROTOCOL;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use subwire_core::ConnectionId;
use subwire_protocol::Dialect;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::connection::{ConnectionHandle, ConnectionState};
use crate::context::OperationContext;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::guard::{self, IntrospectionGuard};
use crate::health::HealthResponse;
use crate::orchestrator::Orchestrator;
use crate::session;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<ServerConfig>,
    dispatcher: Arc<Dispatcher>,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

/// The subwire server.
pub struct SubwireServer {
    config: Arc<ServerConfig>,
    orchestrator: Arc<dyn Orchestrator>,
    guard: IntrospectionGuard,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl SubwireServer {
    /// Create a server forwarding operations to `orchestrator`.
    pub fn new(config: ServerConfig, orchestrator: Arc<dyn Orchestrator>) -> Self {
        let guard = guard::for_config(config.allow_introspection);
        Self {
            config: Arc::new(config),
            orchestrator,
            guard,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Replace the admission guard derived from the config.
    #[must_use]
    pub fn with_guard(mut self, guard: IntrospectionGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let dispatcher = Dispatcher::new(Arc::clone(&self.orchestrator))
            .with_guard(Arc::clone(&self.guard))
            .with_keep_alive(self.config.keep_alive);
        let state = AppState {
            config: Arc::clone(&self.config),
            dispatcher: Arc::new(dispatcher),
            connections: Arc::clone(&self.connections),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route(&self.config.path, get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    pub async fn listen(&self) -> Result<ServerHandle, ServerError> {
        let host = self.config.host.as_str();
        let port = self.config.port;
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let addr = listener.local_addr()?;
        info!(%addr, path = %self.config.path, "subwire server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = served {
                warn!(error = %err, "server stopped with error");
            }
            info!("server stopped");
        });

        Ok(ServerHandle {
            addr,
            task,
            shutdown: Arc::clone(&self.shutdown),
        })
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Signal shutdown and wait for the server task and every live session.
    ///
    /// Returns `false` if the drain timed out.
    pub async fn stop(self) -> bool {
        self.shutdown.drain(self.task, None).await
    }

    /// The server task.
    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// One slot of the connection limit, released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(Arc::clone(counter)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connections.load(Ordering::Acquire);
    Json(HealthResponse::snapshot(
        &state.config,
        state.start_time,
        connections,
        state.shutdown.is_shutting_down(),
    ))
}

/// GET <path>: negotiate the sub-protocol and upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let offered = headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let Some(dialect) = Dialect::negotiate(offered, &state.config.dialects) else {
        warn!(offered, "no supported sub-protocol offered");
        return (StatusCode::BAD_REQUEST, "Unsupported WebSocket sub-protocol").into_response();
    };
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server shutting down").into_response();
    }
    let Some(slot) = ConnectionSlot::acquire(&state.connections, state.config.max_connections)
    else {
        warn!(
            limit = state.config.max_connections,
            "connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let headers = header_map(&headers);
    let dispatcher = Arc::clone(&state.dispatcher);
    let shutdown = state.shutdown.token();
    let tracked = state.shutdown.track_session();
    ws.protocols([dialect.protocol()])
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = ConnectionId::new();
            let handle = Arc::new(ConnectionHandle::new(id.clone(), dialect, tx));
            let context = OperationContext::new(id).with_headers(headers);
            let connection = ConnectionState::new(handle, context);
            session::run_session(socket, connection, rx, dispatcher, shutdown).await;
            drop(slot);
            drop(tracked);
        })
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use subwire_core::{GraphQLRequest, OperationId};
    use tower::ServiceExt;

    struct Noop;

    #[async_trait]
    impl Orchestrator for Noop {
        async fn connect(&self, _connection: Arc<ConnectionHandle>) {}
        async fn disconnect(&self, _connection_id: &ConnectionId) {}
        async fn start(
            &self,
            _connection_id: &ConnectionId,
            _operation_id: OperationId,
            _request: GraphQLRequest,
            _context: Arc<OperationContext>,
        ) {
        }
        async fn once(
            &self,
            _connection_id: &ConnectionId,
            _operation_id: OperationId,
            _request: GraphQLRequest,
            _context: Arc<OperationContext>,
        ) {
        }
        async fn stop(&self, _connection_id: &ConnectionId, _operation_id: &OperationId) {}
    }

    fn make_server() -> SubwireServer {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        SubwireServer::new(config, Arc::new(Noop))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["maxConnections"], 1024);
        assert!(parsed["uptimeSecs"].is_number());
    }

    #[tokio::test]
    async fn health_reports_draining_after_shutdown() {
        let server = make_server();
        let app = server.router();
        server.shutdown().shutdown();

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "draining");
    }

    #[tokio::test]
    async fn plain_get_on_ws_route_is_rejected() {
        let app = make_server().router();
        let req = Request::builder().uri("/graphql").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn connection_slots_respect_limit() {
        let counter = Arc::new(AtomicUsize::new(0));
        let a = ConnectionSlot::acquire(&counter, 2).unwrap();
        let _b = ConnectionSlot::acquire(&counter, 2).unwrap();
        assert!(ConnectionSlot::acquire(&counter, 2).is_none());
        drop(a);
        assert_eq!(counter.load(Ordering::Acquire), 1);
        assert!(ConnectionSlot::acquire(&counter, 2).is_some());
    }

    #[test]
    fn header_map_lowercases_names() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("X-Client", "ios".parse().unwrap());
        let map = header_map(&headers);
        assert_eq!(map.get("x-client").map(String::as_str), Some("ios"));
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops() {
        let server = make_server();
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.port(), 0);
        assert!(handle.stop().await);
        assert!(server.shutdown().is_shutting_down());
        assert_eq!(server.shutdown().live_sessions(), 0);
    }
}
