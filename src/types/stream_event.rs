use serde_json::{Map, Value};

use crate::types::ToolCall;

/// An event decoded from one frame of the agent's response stream.
///
/// Events are transient: they are consumed by the active stream session and
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of the assistant's response text.
    Token {
        /// The text to append to the draft.
        content: String,
    },

    /// The agent started running a tool.
    ToolStart {
        /// The tool's name.
        name: String,
        /// The arguments the tool was started with.
        args: Map<String, Value>,
    },

    /// The most recently started tool finished.
    ToolEnd,

    /// The agent finished its response.
    Done {
        /// The final response text; when absent the accumulated draft is used.
        content: Option<String>,
        /// Tool call records for the final message.
        tool_calls: Option<Vec<ToolCall>>,
    },

    /// A well-formed record this client does not understand.
    Unrecognized {
        /// The frame payload, verbatim.
        raw: String,
    },
}

impl StreamEvent {
    /// Creates a token event.
    pub fn token(content: impl Into<String>) -> Self {
        StreamEvent::Token {
            content: content.into(),
        }
    }

    /// Creates a tool start event with no arguments.
    pub fn tool_start(name: impl Into<String>) -> Self {
        StreamEvent::ToolStart {
            name: name.into(),
            args: Map::new(),
        }
    }

    /// Creates a done event carrying only content.
    pub fn done(content: Option<String>) -> Self {
        StreamEvent::Done {
            content,
            tool_calls: None,
        }
    }

    /// Returns true for the event that ends a response.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. })
    }

    /// The wire name of the event's type, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Token { .. } => "token",
            StreamEvent::ToolStart { .. } => "tool_start",
            StreamEvent::ToolEnd => "tool_end",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Unrecognized { .. } => "unrecognized",
        }
    }
}
