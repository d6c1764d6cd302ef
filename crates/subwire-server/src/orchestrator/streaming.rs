//! Orchestrator that runs operations as tasks over an [`Executor`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use subwire_core::{ConnectionId, GraphQLError, GraphQLRequest, OperationId};
use subwire_protocol::Frame;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Orchestrator;
use crate::connection::ConnectionHandle;
use crate::context::OperationContext;
use crate::executor::Executor;

struct ActiveOperation {
    seq: u64,
    cancel: CancellationToken,
}

/// Operations of one connection.
///
/// Every frame for an operation is sent while holding `operations`, and only
/// if the operation is still registered under the same sequence number. Stop
/// and disconnect deregister under the same lock, so nothing is sent for an
/// operation once they return.
struct ConnectionEntry {
    handle: Arc<ConnectionHandle>,
    operations: Mutex<HashMap<OperationId, ActiveOperation>>,
    next_seq: AtomicU64,
}

impl ConnectionEntry {
    fn new(handle: Arc<ConnectionHandle>) -> Self {
        Self {
            handle,
            operations: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register `id`; `None` if it is already active.
    fn register(&self, id: &OperationId) -> Option<(u64, CancellationToken)> {
        let mut ops = self.operations.lock();
        if ops.contains_key(id) {
            return None;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let _ = ops.insert(
            id.clone(),
            ActiveOperation {
                seq,
                cancel: cancel.clone(),
            },
        );
        Some((seq, cancel))
    }

    fn emit(&self, id: &OperationId, seq: u64, frame: Frame) -> bool {
        let ops = self.operations.lock();
        match ops.get(id) {
            Some(op) if op.seq == seq => self.handle.send(frame),
            _ => false,
        }
    }

    /// Send the terminal frames and deregister, if still registered.
    fn finish(&self, id: &OperationId, seq: u64, frames: impl IntoIterator<Item = Frame>) -> bool {
        let mut ops = self.operations.lock();
        match ops.get(id) {
            Some(op) if op.seq == seq => {
                let _ = ops.remove(id);
                for frame in frames {
                    let _ = self.handle.send(frame);
                }
                true
            }
            _ => false,
        }
    }

    fn stop(&self, id: &OperationId) -> bool {
        match self.operations.lock().remove(id) {
            Some(op) => {
                op.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) -> usize {
        let mut ops = self.operations.lock();
        let count = ops.len();
        for (_, op) in ops.drain() {
            op.cancel.cancel();
        }
        count
    }

    fn len(&self) -> usize {
        self.operations.lock().len()
    }
}

/// [`Orchestrator`] that spawns one task per operation.
///
/// Streaming operations forward every event as a `next` frame and end with
/// exactly one `complete` or `error`; one-shot operations send their single
/// result followed by `complete`. A second `start` for an id that is still
/// active gets a per-operation error.
pub struct StreamingOrchestrator<E> {
    executor: Arc<E>,
    connections: DashMap<ConnectionId, Arc<ConnectionEntry>>,
}

impl<E: Executor> StreamingOrchestrator<E> {
    /// Orchestrator running operations on `executor`.
    pub fn new(executor: Arc<E>) -> Self {
        Self {
            executor,
            connections: DashMap::new(),
        }
    }

    /// The executor.
    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    /// Connected connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Active operations of one connection.
    pub fn operation_count(&self, connection_id: &ConnectionId) -> usize {
        self.connections
            .get(connection_id)
            .map_or(0, |entry| entry.len())
    }

    /// Look up a connection and register the operation on it.
    fn admit(
        &self,
        connection_id: &ConnectionId,
        operation_id: &OperationId,
    ) -> Option<(Arc<ConnectionEntry>, u64, CancellationToken)> {
        let Some(entry) = self.connections.get(connection_id).map(|e| Arc::clone(e.value())) else {
            warn!(%connection_id, %operation_id, "operation for unknown connection");
            return None;
        };
        let Some((seq, cancel)) = entry.register(operation_id) else {
            warn!(%connection_id, %operation_id, "duplicate operation id");
            let _ = entry.handle.send(Frame::Error {
                id: operation_id.clone(),
                errors: vec![GraphQLError::new(format!(
                    "Subscriber for {operation_id} already exists"
                ))],
            });
            return None;
        };
        Some((entry, seq, cancel))
    }
}

#[async_trait]
impl<E: Executor> Orchestrator for StreamingOrchestrator<E> {
    async fn connect(&self, connection: Arc<ConnectionHandle>) {
        let id = connection.id().clone();
        info!(connection_id = %id, "orchestrator connected");
        if let Some(previous) = self
            .connections
            .insert(id, Arc::new(ConnectionEntry::new(connection)))
        {
            let _ = previous.cancel_all();
        }
    }

    async fn disconnect(&self, connection_id: &ConnectionId) {
        if let Some((_, entry)) = self.connections.remove(connection_id) {
            let cancelled = entry.cancel_all();
            info!(%connection_id, cancelled, "orchestrator disconnected");
        }
    }

    async fn start(
        &self,
        connection_id: &ConnectionId,
        operation_id: OperationId,
        request: GraphQLRequest,
        context: Arc<OperationContext>,
    ) {
        let Some((entry, seq, cancel)) = self.admit(connection_id, &operation_id) else {
            return;
        };
        debug!(%connection_id, %operation_id, "starting subscription");
        let executor = Arc::clone(&self.executor);
        drop(tokio::spawn(run_stream(
            entry,
            executor,
            operation_id,
            seq,
            cancel,
            request,
            context,
        )));
    }

    async fn once(
        &self,
        connection_id: &ConnectionId,
        operation_id: OperationId,
        request: GraphQLRequest,
        context: Arc<OperationContext>,
    ) {
        let Some((entry, seq, cancel)) = self.admit(connection_id, &operation_id) else {
            return;
        };
        debug!(%connection_id, %operation_id, "executing operation");
        let executor = Arc::clone(&self.executor);
        drop(tokio::spawn(run_once(
            entry,
            executor,
            operation_id,
            seq,
            cancel,
            request,
            context,
        )));
    }

    async fn stop(&self, connection_id: &ConnectionId, operation_id: &OperationId) {
        let stopped = self
            .connections
            .get(connection_id)
            .is_some_and(|entry| entry.stop(operation_id));
        debug!(%connection_id, %operation_id, stopped, "stop");
    }
}

async fn run_stream<E: Executor>(
    entry: Arc<ConnectionEntry>,
    executor: Arc<E>,
    id: OperationId,
    seq: u64,
    cancel: CancellationToken,
    request: GraphQLRequest,
    context: Arc<OperationContext>,
) {
    let subscribed = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        subscribed = executor.subscribe(request, context) => subscribed,
    };
    let mut stream = match subscribed {
        Ok(stream) => stream,
        Err(errors) => {
            let _ = entry.finish(&id, seq, [Frame::Error { id: id.clone(), errors }]);
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            item = stream.next() => match item {
                Some(payload) => {
                    if !entry.emit(&id, seq, Frame::Next { id: id.clone(), payload }) {
                        return;
                    }
                }
                None => {
                    let _ = entry.finish(&id, seq, [Frame::Complete { id: id.clone() }]);
                    return;
                }
            }
        }
    }
}

async fn run_once<E: Executor>(
    entry: Arc<ConnectionEntry>,
    executor: Arc<E>,
    id: OperationId,
    seq: u64,
    cancel: CancellationToken,
    request: GraphQLRequest,
    context: Arc<OperationContext>,
) {
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = executor.execute(request, context) => result,
    };
    let frames = if result.data.is_none() && !result.errors.is_empty() {
        vec![Frame::Error {
            id: id.clone(),
            errors: result.errors,
        }]
    } else {
        vec![
            Frame::Next {
                id: id.clone(),
                payload: result,
            },
            Frame::Complete { id: id.clone() },
        ]
    };
    let _ = entry.finish(&id, seq, frames);
}
