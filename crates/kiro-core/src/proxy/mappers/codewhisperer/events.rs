//! Decoded upstream frames -> typed upstream events.

use serde::Deserialize;
use serde_json::Value;

use kiro_types::error::UpstreamError;

use crate::proxy::upstream::eventstream::Frame;

/// One event of the upstream reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    AssistantText(String),
    /// A fragment of a tool call. The same `tool_use_id` repeats until `stop`.
    ToolUse {
        tool_use_id: String,
        name: String,
        /// Raw JSON fragment of the arguments
        input: Option<String>,
        stop: bool,
    },
    MessageStop,
    /// Event types that carry nothing for the client (metering, context usage, ...)
    Ignored(String),
    /// In-band exception reported after the HTTP status was already 200
    Exception { kind: String, message: String },
    /// The body ended cleanly
    Completed,
}

#[derive(Deserialize)]
struct AssistantResponsePayload {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolUsePayload {
    tool_use_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    stop: bool,
}

#[derive(Deserialize)]
struct ExceptionPayload {
    #[serde(default, alias = "Message")]
    message: Option<String>,
}

impl UpstreamEvent {
    pub fn from_frame(frame: &Frame) -> Result<Self, UpstreamError> {
        match frame.message_type().unwrap_or("event") {
            "exception" | "error" => {
                let kind = frame
                    .header_str(":exception-type")
                    .or_else(|| frame.header_str(":error-code"))
                    .unwrap_or("UnknownException")
                    .to_string();
                let message = serde_json::from_slice::<ExceptionPayload>(&frame.payload)
                    .ok()
                    .and_then(|p| p.message)
                    .unwrap_or_else(|| String::from_utf8_lossy(&frame.payload).into_owned());
                Ok(Self::Exception { kind, message })
            },
            _ => Self::from_event(frame.event_type().unwrap_or_default(), &frame.payload),
        }
    }

    fn from_event(event_type: &str, payload: &[u8]) -> Result<Self, UpstreamError> {
        match event_type {
            "assistantResponseEvent" => {
                let p: AssistantResponsePayload = parse_payload(event_type, payload)?;
                Ok(Self::AssistantText(p.content))
            },
            "toolUseEvent" => {
                let p: ToolUsePayload = parse_payload(event_type, payload)?;
                // Input arrives either as a JSON fragment string or a complete object
                let input = match p.input {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s),
                    Some(other) => Some(other.to_string()),
                };
                Ok(Self::ToolUse { tool_use_id: p.tool_use_id, name: p.name, input, stop: p.stop })
            },
            "messageStopEvent" => Ok(Self::MessageStop),
            other => {
                tracing::trace!(event_type = other, "Ignoring upstream event");
                Ok(Self::Ignored(other.to_string()))
            },
        }
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(event_type: &str, payload: &[u8]) -> Result<T, UpstreamError> {
    serde_json::from_slice(payload).map_err(|e| UpstreamError::MalformedResponse {
        message: format!("invalid {} payload: {}", event_type, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::upstream::eventstream::{encode_event, encode_frame, EventStreamDecoder};
    use serde_json::json;

    fn frame(bytes: &[u8]) -> Frame {
        let mut decoder = EventStreamDecoder::new();
        decoder.feed(bytes);
        decoder.next_frame().unwrap().unwrap()
    }

    #[test]
    fn test_tool_use_input_forms() {
        let fragment = frame(&encode_event(
            "toolUseEvent",
            &json!({"toolUseId": "t1", "name": "lookup", "input": "{\"q\":"}),
        ));
        assert_eq!(
            UpstreamEvent::from_frame(&fragment).unwrap(),
            UpstreamEvent::ToolUse {
                tool_use_id: "t1".to_string(),
                name: "lookup".to_string(),
                input: Some("{\"q\":".to_string()),
                stop: false,
            }
        );

        let object = frame(&encode_event(
            "toolUseEvent",
            &json!({"toolUseId": "t1", "name": "lookup", "input": {"q": 1}, "stop": true}),
        ));
        let UpstreamEvent::ToolUse { input, stop, .. } = UpstreamEvent::from_frame(&object).unwrap() else {
            panic!("expected tool use");
        };
        assert_eq!(input.as_deref(), Some(r#"{"q":1}"#));
        assert!(stop);
    }

    #[test]
    fn test_exception_frame() {
        let f = frame(&encode_frame(
            &[(":message-type", "exception"), (":exception-type", "ThrottlingException")],
            br#"{"message":"Too many requests"}"#,
        ));
        assert_eq!(
            UpstreamEvent::from_frame(&f).unwrap(),
            UpstreamEvent::Exception {
                kind: "ThrottlingException".to_string(),
                message: "Too many requests".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_and_invalid_events() {
        let metering = frame(&encode_event("meteringEvent", &json!({"usage": 1})));
        assert_eq!(
            UpstreamEvent::from_frame(&metering).unwrap(),
            UpstreamEvent::Ignored("meteringEvent".to_string())
        );

        let broken = frame(&encode_frame(
            &[(":message-type", "event"), (":event-type", "assistantResponseEvent")],
            b"not json",
        ));
        assert!(matches!(UpstreamEvent::from_frame(&broken), Err(UpstreamError::MalformedResponse { .. })));
    }
}
