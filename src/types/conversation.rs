use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::Message;

/// A conversation with the debugging agent.
///
/// The order of `messages` is chronological order.  List endpoints return
/// conversations without their messages; fetch a single conversation to get
/// its full history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Unique identifier of the conversation.
    pub id: String,

    /// Optional human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The committed message history.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// When the conversation was created.
    #[serde(default, with = "crate::utils::time")]
    pub created_at: Option<OffsetDateTime>,

    /// When a message was last appended.
    #[serde(default, with = "crate::utils::time")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Conversation {
    /// Creates an empty conversation with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            title: None,
            messages: Vec::new(),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Appends a committed message and bumps `updated_at`.
    pub fn append(&mut self, message: Message) {
        self.updated_at = message.created_at.or(Some(OffsetDateTime::now_utc()));
        self.messages.push(message);
    }

    /// A short label for lists: the title, or the id when untitled.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}
