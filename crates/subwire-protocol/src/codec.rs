//! Text frame → [`Command`].

use serde_json::{Map, Value};
use subwire_core::{GraphQLRequest, OperationId, OperationKind};
use tracing::debug;

use crate::command::Command;
use crate::dialect::Dialect;
use crate::error::CodecError;

/// Decode one text frame. Never fails: decode errors come back as
/// [`Command::Fatal`] or [`Command::Error`].
pub fn decode(dialect: Dialect, text: &str) -> Command {
    try_decode(dialect, text).unwrap_or_else(CodecError::into_command)
}

/// Decode one text frame, keeping the error.
pub fn try_decode(dialect: Dialect, text: &str) -> Result<Command, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(message) = value else {
        return Err(CodecError::NotAnObject);
    };
    let kind = message
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingType)?;

    let command = match (dialect, kind) {
        (_, "connection_init") => Command::Initial {
            payload: message.get("payload").filter(|p| !p.is_null()).cloned(),
        },
        (Dialect::GraphqlTransportWs, "ping") => Command::Ping,
        (Dialect::GraphqlTransportWs, "subscribe") | (Dialect::GraphqlWs, "start") => {
            operation(&message, kind)?
        }
        (Dialect::GraphqlTransportWs, "complete") | (Dialect::GraphqlWs, "stop") => Command::Stop {
            id: operation_id(&message, kind)?,
        },
        (Dialect::GraphqlWs, "connection_terminate") => Command::Terminate,
        _ => {
            debug!(dialect = %dialect, kind, "ignoring message");
            Command::Ignore
        }
    };
    Ok(command)
}

fn operation_id(message: &Map<String, Value>, kind: &str) -> Result<OperationId, CodecError> {
    match message.get("id") {
        Some(Value::String(id)) => Ok(OperationId::from_raw(id.as_str())),
        Some(Value::Number(n)) => Ok(OperationId::from_raw(n.to_string())),
        _ => Err(CodecError::MissingId {
            kind: kind.to_owned(),
        }),
    }
}

/// `subscribe`/`start`: classify the request by its operation kind.
fn operation(message: &Map<String, Value>, kind: &str) -> Result<Command, CodecError> {
    let id = operation_id(message, kind)?;
    let payload = message.get("payload").cloned().unwrap_or(Value::Null);
    let request: GraphQLRequest = match serde_json::from_value(payload) {
        Ok(request) => request,
        Err(err) => {
            return Err(CodecError::InvalidPayload {
                id,
                message: err.to_string(),
            })
        }
    };

    // Documents we cannot classify go through the one-shot path so the
    // executor reports the validation error.
    Ok(match request.operation_kind() {
        Some(OperationKind::Subscription) => Command::Start { id, request },
        _ => Command::Once { id, request },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TWS: Dialect = Dialect::GraphqlTransportWs;
    const WS: Dialect = Dialect::GraphqlWs;

    fn id(s: &str) -> OperationId {
        OperationId::from(s)
    }

    #[test]
    fn connection_init_both_dialects() {
        for d in Dialect::ALL {
            assert_eq!(
                decode(d, r#"{"type":"connection_init"}"#),
                Command::Initial { payload: None }
            );
        }
        assert_eq!(
            decode(TWS, r#"{"type":"connection_init","payload":{"token":"t"}}"#),
            Command::Initial {
                payload: Some(json!({"token": "t"}))
            }
        );
    }

    #[test]
    fn subscription_becomes_start() {
        let text = r#"{"type":"subscribe","id":"1","payload":{"query":"subscription { ticks }"}}"#;
        assert_eq!(
            decode(TWS, text),
            Command::Start {
                id: id("1"),
                request: GraphQLRequest::new("subscription { ticks }")
            }
        );
        let text = r#"{"type":"start","id":"1","payload":{"query":"subscription { ticks }"}}"#;
        assert_eq!(decode(WS, text).name(), "start");
    }

    #[test]
    fn query_and_mutation_become_once() {
        let q = r#"{"type":"subscribe","id":"a","payload":{"query":"{ topics }"}}"#;
        assert_eq!(decode(TWS, q).name(), "once");
        let m = r#"{"type":"start","id":"b","payload":{"query":"mutation { publish }"}}"#;
        assert_eq!(decode(WS, m).name(), "once");
    }

    #[test]
    fn unparseable_document_becomes_once() {
        let text = r#"{"type":"subscribe","id":"1","payload":{"query":"nonsense"}}"#;
        assert_eq!(decode(TWS, text).name(), "once");
    }

    #[test]
    fn operation_name_selects_kind() {
        let text = json!({
            "type": "subscribe",
            "id": "1",
            "payload": {
                "query": "query A { a } subscription B { b }",
                "operationName": "B"
            }
        })
        .to_string();
        assert_eq!(decode(TWS, &text).name(), "start");
    }

    #[test]
    fn stop_both_dialects() {
        assert_eq!(
            decode(TWS, r#"{"type":"complete","id":"9"}"#),
            Command::Stop { id: id("9") }
        );
        assert_eq!(
            decode(WS, r#"{"type":"stop","id":"9"}"#),
            Command::Stop { id: id("9") }
        );
    }

    #[test]
    fn numeric_ids_are_accepted() {
        assert_eq!(
            decode(WS, r#"{"type":"stop","id":3}"#),
            Command::Stop { id: id("3") }
        );
    }

    #[test]
    fn ping_and_terminate() {
        assert_eq!(decode(TWS, r#"{"type":"ping"}"#), Command::Ping);
        assert_eq!(decode(TWS, r#"{"type":"pong"}"#), Command::Ignore);
        assert_eq!(
            decode(WS, r#"{"type":"connection_terminate"}"#),
            Command::Terminate
        );
    }

    #[test]
    fn messages_of_the_other_dialect_are_ignored() {
        assert_eq!(decode(WS, r#"{"type":"subscribe","id":"1"}"#), Command::Ignore);
        assert_eq!(decode(TWS, r#"{"type":"stop","id":"1"}"#), Command::Ignore);
        assert_eq!(decode(TWS, r#"{"type":"wat"}"#), Command::Ignore);
    }

    #[test]
    fn malformed_frames_are_fatal() {
        for text in ["not json", "[1,2]", r#"{"id":"1"}"#, r#"{"type":5}"#] {
            assert!(
                matches!(decode(TWS, text), Command::Fatal { .. }),
                "{text} should be fatal"
            );
        }
    }

    #[test]
    fn missing_id_is_fatal() {
        let err = try_decode(TWS, r#"{"type":"subscribe","payload":{"query":"{a}"}}"#).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, CodecError::MissingId { .. }));
        assert!(matches!(
            decode(WS, r#"{"type":"stop"}"#),
            Command::Fatal { .. }
        ));
    }

    #[test]
    fn invalid_payload_is_per_operation() {
        let cmd = decode(TWS, r#"{"type":"subscribe","id":"4","payload":{"nope":1}}"#);
        match cmd {
            Command::Error { id: op, message } => {
                assert_eq!(op, id("4"));
                assert!(message.contains("query"));
            }
            other => panic!("expected per-operation error, got {other:?}"),
        }
        assert!(matches!(
            decode(WS, r#"{"type":"start","id":"4"}"#),
            Command::Error { .. }
        ));
    }
}
