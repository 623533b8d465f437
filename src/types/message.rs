use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::ToolCall;

/// The author of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// A message typed by the user.
    User,
    /// A message produced by the debugging agent.
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One committed entry in a conversation's history.
///
/// Messages are immutable once committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique identifier of the message.
    pub id: String,

    /// Who wrote the message.
    pub role: MessageRole,

    /// The textual content.
    #[serde(default)]
    pub content: String,

    /// Tools the agent invoked while producing this message, in invocation order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// When the message was created.
    #[serde(default, with = "crate::utils::time")]
    pub created_at: Option<OffsetDateTime>,
}

impl Message {
    /// Creates a message stamped with the current time and a fresh local id.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: None,
            created_at: Some(OffsetDateTime::now_utc()),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Attaches tool call records.
    pub fn with_tool_calls(mut self, tool_calls: Option<Vec<ToolCall>>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}
