//! Query execution seam and the topic-backed executor.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::{Map, Value};
use subwire_broadcast::PubSub;
use subwire_core::{GraphQLError, GraphQLRequest, GraphQLResult, OperationKind};
use tracing::debug;

use crate::context::OperationContext;

/// Executes GraphQL operations for a [`StreamingOrchestrator`].
///
/// [`StreamingOrchestrator`]: crate::orchestrator::StreamingOrchestrator
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Run a query or mutation to a single result.
    async fn execute(&self, request: GraphQLRequest, context: Arc<OperationContext>)
        -> GraphQLResult;

    /// Start a subscription. `Err` rejects it before any event is produced.
    async fn subscribe(
        &self,
        request: GraphQLRequest,
        context: Arc<OperationContext>,
    ) -> Result<BoxStream<'static, GraphQLResult>, Vec<GraphQLError>>;
}

/// Executor that maps subscriptions onto [`PubSub`] topics.
///
/// - `subscription { <field> }` streams topic `<field>` (or the `topic`
///   variable when given), each event as `{ "<field>": payload }`
/// - `mutation { publish }` publishes the `payload` variable to the `topic`
///   variable and returns the number of receivers
/// - `query { topics }` lists the live topics
pub struct TopicExecutor {
    pubsub: Arc<PubSub>,
}

impl TopicExecutor {
    /// Executor over `pubsub`.
    pub fn new(pubsub: Arc<PubSub>) -> Self {
        Self { pubsub }
    }

    /// The backing registry.
    pub fn pubsub(&self) -> &Arc<PubSub> {
        &self.pubsub
    }

    fn resolve_query(&self, field: &str) -> Result<Value, GraphQLError> {
        match field {
            "topics" => {
                let mut topics = self.pubsub.topics();
                topics.sort();
                Ok(Value::from(topics))
            }
            "__typename" => Ok(Value::from("Query")),
            other => Err(unknown_field(other, "Query")),
        }
    }

    fn resolve_mutation(&self, field: &str, request: &GraphQLRequest) -> Result<Value, GraphQLError> {
        match field {
            "publish" => {
                let topic = request
                    .variable("topic")
                    .and_then(Value::as_str)
                    .ok_or_else(|| GraphQLError::new("publish requires a string `topic` variable"))?;
                let payload = request.variable("payload").cloned().unwrap_or(Value::Null);
                let delivered = self
                    .pubsub
                    .publish(topic, &payload)
                    .map_err(|e| GraphQLError::new(e.to_string()))?;
                debug!(topic, delivered, "published");
                Ok(Value::from(delivered))
            }
            "__typename" => Ok(Value::from("Mutation")),
            other => Err(unknown_field(other, "Mutation")),
        }
    }
}

fn unknown_field(field: &str, parent: &str) -> GraphQLError {
    GraphQLError::new(format!("Cannot query field \"{field}\" on type \"{parent}\"."))
}

fn no_operation() -> GraphQLError {
    GraphQLError::new("Could not find an operation to execute")
}

#[async_trait]
impl Executor for TopicExecutor {
    async fn execute(
        &self,
        request: GraphQLRequest,
        _context: Arc<OperationContext>,
    ) -> GraphQLResult {
        let Some(summary) = request.summary() else {
            return GraphQLResult::errors(vec![no_operation()]);
        };

        let mut data = Map::new();
        let mut errors = Vec::new();
        for field in &summary.root_fields {
            let resolved = match summary.kind {
                OperationKind::Query => self.resolve_query(field),
                OperationKind::Mutation => self.resolve_mutation(field, &request),
                OperationKind::Subscription => Err(GraphQLError::new(
                    "Subscriptions must be started as streaming operations",
                )),
            };
            match resolved {
                Ok(value) => {
                    let _ = data.insert(field.clone(), value);
                }
                Err(err) => errors.push(err),
            }
        }

        if data.is_empty() {
            if errors.is_empty() {
                errors.push(no_operation());
            }
            GraphQLResult::errors(errors)
        } else {
            GraphQLResult {
                data: Some(Value::Object(data)),
                errors,
            }
        }
    }

    async fn subscribe(
        &self,
        request: GraphQLRequest,
        context: Arc<OperationContext>,
    ) -> Result<BoxStream<'static, GraphQLResult>, Vec<GraphQLError>> {
        let summary = request.summary().ok_or_else(|| vec![no_operation()])?;
        if summary.kind != OperationKind::Subscription {
            return Err(vec![GraphQLError::new("Operation is not a subscription")]);
        }
        let field = summary
            .root_fields
            .first()
            .cloned()
            .ok_or_else(|| vec![GraphQLError::new("Subscription selects no field")])?;
        let topic = request
            .variable("topic")
            .and_then(Value::as_str)
            .map_or_else(|| field.clone(), str::to_owned);

        debug!(connection_id = %context.connection_id, topic, "subscribing to topic");
        let stream = self
            .pubsub
            .async_stream::<Value>(&topic)
            .map(move |item| match item {
                Ok(payload) => {
                    let mut data = Map::new();
                    let _ = data.insert(field.clone(), payload);
                    GraphQLResult::data(Value::Object(data))
                }
                Err(err) => GraphQLResult::errors(vec![GraphQLError::new(err.to_string())]),
            });
        Ok(stream.boxed())
    }
}
