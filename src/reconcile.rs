//! Conversation reconciliation.
//!
//! A terminated [`StreamSession`] leaves an [`Outcome`]; reconciliation turns
//! it into at most one assistant [`Message`] for the conversation's history.
//! The outcome is taken out of the session when reconciled, so a second call
//! (for instance after a late stream-closure signal) finds nothing to commit.

use crate::session::{Outcome, StreamSession};
use crate::types::{Conversation, Message};

/// Prefix that marks an assistant message as a failure report.
pub const ERROR_PREFIX: &str = "Error: ";

/// Builds the optimistic user message for a send.
pub fn user_message(content: impl Into<String>) -> Message {
    Message::user(content)
}

/// Builds the assistant message reporting a failed stream.
pub fn error_message(description: &str) -> Message {
    Message::assistant(format!("{ERROR_PREFIX}{description}"))
}

/// Appends the optimistic user message for a send, returning it.
pub fn commit_user<'a>(conversation: &'a mut Conversation, content: &str) -> &'a Message {
    conversation.append(user_message(content));
    &conversation.messages[conversation.messages.len() - 1]
}

/// Produces the message a terminated session contributes to history.
///
/// Returns `None` while the session is still running, for cancelled sessions,
/// for streams that closed without any text, and on every call after the
/// first.  Clears the session's draft and tool stack.
pub fn reconcile(session: &mut StreamSession) -> Option<Message> {
    if !session.is_terminal() {
        return None;
    }
    let outcome = session.take_outcome()?;
    session.clear_transient();
    match outcome {
        Outcome::Completed {
            content,
            tool_calls,
        } => Some(Message::assistant(content).with_tool_calls(tool_calls)),
        Outcome::Errored { message } => Some(error_message(&message)),
        Outcome::Empty | Outcome::Cancelled => None,
    }
}

/// Reconciles `session` into `conversation`, returning the appended message.
///
/// Nothing is appended when the session belongs to another conversation; its
/// outcome is left in place.
pub fn commit<'a>(
    conversation: &'a mut Conversation,
    session: &mut StreamSession,
) -> Option<&'a Message> {
    if session.conversation_id() != conversation.id {
        return None;
    }
    let message = reconcile(session)?;
    conversation.append(message);
    conversation.messages.last()
}
