//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use subwire_protocol::{codec, Dialect};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::connection::{ConnectionState, Outbound};
use crate::dispatcher::{Dispatcher, Flow};

/// How long the writer may take to flush after the reader stops.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Run a session until the socket closes or the connection terminates.
///
/// Inbound frames are decoded and dispatched one at a time, so commands of
/// one connection never overlap. Outbound frames from every source are
/// written by a single writer task in queue order.
#[instrument(skip_all, fields(connection_id = %state.id(), dialect = %state.handle.dialect()))]
pub async fn run_session(
    socket: WebSocket,
    mut state: ConnectionState,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) {
    let dialect = state.handle.dialect();
    let (ws_tx, mut ws_rx) = socket.split();
    let mut writer = tokio::spawn(write_outbound(ws_tx, outbound, dialect));
    let mut writer_done = false;
    info!("client connected");

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = shutdown.cancelled() => {
                dispatcher.going_away(&mut state).await;
                break;
            }
            _ = &mut writer => {
                debug!("writer stopped");
                writer_done = true;
                break;
            }
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                let command = codec::decode(dialect, text.as_str());
                trace!(command = command.name(), "received");
                if dispatcher.dispatch(&mut state, command).await == Flow::Close {
                    break;
                }
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(len = data.len(), "binary frame");
                dispatcher.reject_transport(&mut state).await;
                break;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(err)) if is_invalid_text(&err) => {
                debug!(error = %err, "text frame is not valid UTF-8");
                dispatcher.reject_transport(&mut state).await;
                break;
            }
            Some(Err(err)) => {
                debug!(error = %err, "socket read failed");
                break;
            }
        }
    }

    dispatcher.socket_closed(&mut state).await;
    let handle = Arc::clone(&state.handle);
    let _ = handle.close(subwire_protocol::CloseCode::GoingAway, "");
    drop(state);

    if !writer_done && tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
    info!(
        dropped_frames = handle.drop_count(),
        age_ms = u64::try_from(handle.age().as_millis()).unwrap_or(u64::MAX),
        "client disconnected"
    );
}

/// Whether a read failed because a text frame did not decode as UTF-8.
fn is_invalid_text(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if matches!(current.downcast_ref::<WsError>(), Some(WsError::Utf8 { .. })) {
            return true;
        }
        source = current.source();
    }
    false
}

/// Drain the outbound queue into the socket until a close is written.
async fn write_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    dialect: Dialect,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(frame) => {
                trace!(frame = frame.name(), "send");
                let text = frame.encode(dialect);
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let close = CloseFrame {
                    code: code.code(),
                    reason: reason.into(),
                };
                let _ = ws_tx.send(Message::Close(Some(close))).await;
                break;
            }
        }
    }
    let _ = ws_tx.close().await;
}
