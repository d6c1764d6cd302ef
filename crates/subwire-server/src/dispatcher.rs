//! Connection state machine.

use std::sync::Arc;
use std::time::Duration;

use subwire_core::{GraphQLError, GraphQLRequest, OperationId};
use subwire_protocol::{CloseCode, Command, Frame};
use tracing::{debug, info, instrument, warn};

use crate::connection::{ConnectionState, Phase};
use crate::guard::{allow_all, IntrospectionGuard};
use crate::orchestrator::Orchestrator;

/// Close reasons are capped by the WebSocket frame format.
const MAX_CLOSE_REASON: usize = 123;

/// What the session loop should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading frames.
    Continue,
    /// The connection is terminated; stop reading.
    Close,
}

/// Applies commands to a [`ConnectionState`].
///
/// | Command      | Pending            | Active                       |
/// |--------------|--------------------|------------------------------|
/// | initial      | ack, timer, Active | fatal                        |
/// | ping         | pong               | pong                         |
/// | terminate    | close (going away) | disconnect, close            |
/// | start / once | fatal              | guard, forward               |
/// | stop         | fatal              | forward                      |
/// | error        | error frame        | error frame                  |
/// | fatal        | close (policy)     | error, disconnect, close     |
///
/// The orchestrator is told about a connection at handshake and receives
/// exactly one `disconnect` for it, whichever teardown path runs first.
pub struct Dispatcher {
    orchestrator: Arc<dyn Orchestrator>,
    guard: IntrospectionGuard,
    keep_alive: Option<Duration>,
}

impl Dispatcher {
    /// Dispatcher forwarding to `orchestrator`, admitting every request and
    /// without keep-alive.
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self {
            orchestrator,
            guard: allow_all(),
            keep_alive: None,
        }
    }

    /// Replace the admission guard.
    #[must_use]
    pub fn with_guard(mut self, guard: IntrospectionGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Set the keep-alive interval; `None` disables the timer.
    #[must_use]
    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }

    /// The orchestrator commands are forwarded to.
    pub fn orchestrator(&self) -> &Arc<dyn Orchestrator> {
        &self.orchestrator
    }

    /// Apply one command.
    #[instrument(skip_all, fields(connection_id = %state.id(), command = command.name()))]
    pub async fn dispatch(&self, state: &mut ConnectionState, command: Command) -> Flow {
        if state.phase == Phase::Terminated {
            debug!("command after termination ignored");
            return Flow::Close;
        }

        match command {
            Command::Initial { payload } => {
                if state.phase == Phase::Active {
                    return self.fatal(state, "Too many initialisation requests").await;
                }
                let mut context = (*state.context).clone();
                context.init_payload = payload;
                state.context = Arc::new(context);
                state.phase = Phase::Active;

                self.orchestrator.connect(Arc::clone(&state.handle)).await;
                state.connected = true;
                let _ = state.handle.send(Frame::Ack);
                if let Some(interval) = self.keep_alive {
                    let _ = state.keep_alive.start(Arc::clone(&state.handle), interval);
                }
                info!("connection initialised");
                Flow::Continue
            }
            Command::Ping => {
                let _ = state.handle.send(Frame::Pong);
                Flow::Continue
            }
            Command::Terminate => {
                info!("client terminated connection");
                self.teardown(state, CloseCode::GoingAway, CloseCode::GoingAway.reason())
                    .await;
                Flow::Close
            }
            Command::Start { id, request } => {
                if state.phase != Phase::Active {
                    return self.fatal(state, "Unauthorized").await;
                }
                if self.admit(state, &id, &request) {
                    let context = Arc::clone(&state.context);
                    self.orchestrator
                        .start(state.id(), id, request, context)
                        .await;
                }
                Flow::Continue
            }
            Command::Once { id, request } => {
                if state.phase != Phase::Active {
                    return self.fatal(state, "Unauthorized").await;
                }
                if self.admit(state, &id, &request) {
                    let context = Arc::clone(&state.context);
                    self.orchestrator
                        .once(state.id(), id, request, context)
                        .await;
                }
                Flow::Continue
            }
            Command::Stop { id } => {
                if state.phase != Phase::Active {
                    return self.fatal(state, "Unauthorized").await;
                }
                self.orchestrator.stop(state.id(), &id).await;
                Flow::Continue
            }
            Command::Error { id, message } => {
                debug!(operation_id = %id, message, "operation rejected");
                let _ = state.handle.send(Frame::Error {
                    id,
                    errors: vec![GraphQLError::new(message)],
                });
                Flow::Continue
            }
            Command::Fatal { message } => self.fatal(state, &message).await,
            Command::Ignore => Flow::Continue,
        }
    }

    /// The socket closed underneath us. Sends nothing.
    #[instrument(skip_all, fields(connection_id = %state.id()))]
    pub async fn socket_closed(&self, state: &mut ConnectionState) {
        if state.phase == Phase::Terminated {
            return;
        }
        state.phase = Phase::Terminated;
        self.release(state).await;
        info!("socket closed");
    }

    /// A frame was not valid text: close with the invalid-payload code.
    ///
    /// The frame itself never reaches the orchestrator; a connection that
    /// already completed its handshake is still released.
    #[instrument(skip_all, fields(connection_id = %state.id()))]
    pub async fn reject_transport(&self, state: &mut ConnectionState) {
        if state.phase == Phase::Terminated {
            return;
        }
        warn!("non-text frame, closing connection");
        self.teardown(
            state,
            CloseCode::InvalidPayload,
            CloseCode::InvalidPayload.reason(),
        )
        .await;
    }

    /// The server is shutting down: release and close with going-away.
    #[instrument(skip_all, fields(connection_id = %state.id()))]
    pub async fn going_away(&self, state: &mut ConnectionState) {
        if state.phase == Phase::Terminated {
            return;
        }
        info!("closing connection for shutdown");
        self.teardown(state, CloseCode::GoingAway, "Server shutting down")
            .await;
    }

    fn admit(&self, state: &ConnectionState, id: &OperationId, request: &GraphQLRequest) -> bool {
        match (self.guard)(request) {
            Ok(()) => true,
            Err(message) => {
                warn!(operation_id = %id, message, "operation refused by guard");
                let _ = state.handle.send(Frame::Error {
                    id: id.clone(),
                    errors: vec![GraphQLError::new(message)],
                });
                false
            }
        }
    }

    async fn fatal(&self, state: &mut ConnectionState, message: &str) -> Flow {
        warn!(message, "protocol violation");
        let _ = state.handle.send(Frame::ConnectionError {
            message: message.to_string(),
        });
        self.teardown(state, CloseCode::PolicyViolation, message)
            .await;
        Flow::Close
    }

    async fn teardown(&self, state: &mut ConnectionState, code: CloseCode, reason: &str) {
        state.phase = Phase::Terminated;
        self.release(state).await;
        let _ = state.handle.close(code, close_reason(reason));
    }

    async fn release(&self, state: &mut ConnectionState) {
        if std::mem::take(&mut state.connected) {
            self.orchestrator.disconnect(state.id()).await;
        }
        let _ = state.keep_alive.invalidate();
    }
}

fn close_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}
