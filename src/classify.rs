//! Classification of frame payloads into stream events.
//!
//! The agent normally sends one JSON record per frame, discriminated by its
//! `type` field.  Older agents stream plain text instead, and some proxies
//! append an OpenAI-style `[DONE]` sentinel.  All three shapes are handled
//! here; nothing a payload contains can make classification fail.

use serde_json::{Map, Value};

use crate::types::{StreamEvent, ToolCall};

/// Payload that marks the end of the stream in OpenAI-compatible framing.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Name reported for a `tool_start` record that names no tool.
pub const UNKNOWN_TOOL: &str = "unknown";

/// How a frame payload was understood.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// A JSON payload, decoded into an event.
    Structured(StreamEvent),
    /// The `[DONE]` end-of-stream marker.
    Sentinel,
    /// A payload that is not JSON, taken as literal response text.
    RawToken(String),
}

impl Classified {
    /// Collapses the classification into the event the session consumes.
    pub fn into_event(self) -> StreamEvent {
        match self {
            Classified::Structured(event) => event,
            Classified::Sentinel => StreamEvent::Done {
                content: None,
                tool_calls: None,
            },
            Classified::RawToken(content) => StreamEvent::Token { content },
        }
    }
}

/// Classifies one frame payload.
///
/// Returns `None` when the frame carries nothing: an empty payload, or a
/// token record with no content.
pub fn classify(payload: &str) -> Option<Classified> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(record)) => classify_record(payload, record).map(Classified::Structured),
        Ok(_) => Some(Classified::Structured(StreamEvent::Unrecognized {
            raw: payload.to_string(),
        })),
        Err(_) if payload == DONE_SENTINEL => Some(Classified::Sentinel),
        Err(_) if payload.is_empty() => None,
        Err(_) => Some(Classified::RawToken(payload.to_string())),
    }
}

fn classify_record(payload: &str, mut record: Map<String, Value>) -> Option<StreamEvent> {
    let kind = record
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default();
    match kind.as_str() {
        "token" => match record.remove("content") {
            Some(Value::String(content)) if !content.is_empty() => {
                Some(StreamEvent::Token { content })
            }
            _ => None,
        },
        "tool_start" => {
            let name = ["tool", "name"]
                .iter()
                .find_map(|key| record.get(*key).and_then(Value::as_str))
                .unwrap_or(UNKNOWN_TOOL)
                .to_string();
            let args = ["args", "arguments", "input"]
                .iter()
                .find_map(|key| match record.remove(*key) {
                    Some(Value::Object(args)) => Some(args),
                    _ => None,
                })
                .unwrap_or_default();
            Some(StreamEvent::ToolStart { name, args })
        }
        "tool_end" => Some(StreamEvent::ToolEnd),
        "done" => {
            let content = match record.remove("content") {
                Some(Value::String(content)) => Some(content),
                _ => None,
            };
            let tool_calls = ["tool_calls", "toolCalls"]
                .iter()
                .find_map(|key| record.remove(*key))
                .and_then(|calls| serde_json::from_value::<Vec<ToolCall>>(calls).ok());
            Some(StreamEvent::Done {
                content,
                tool_calls,
            })
        }
        _ => Some(StreamEvent::Unrecognized {
            raw: payload.to_string(),
        }),
    }
}
