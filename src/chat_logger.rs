//! Logging trait for chat stream operations.
//!
//! This module provides the [`ChatLogger`] trait that allows users to capture
//! everything a stream session observes and everything the registry commits
//! to a conversation's history.

use crate::{Message, SessionState, StreamEvent};

/// A trait for logging chat stream operations.
///
/// Implement this trait to record raw frames, decoded events and committed
/// messages, e.g. to debug a misbehaving agent.
///
/// # Example
///
/// ```rust,ignore
/// use codecircle::{ChatLogger, Message, SessionState, StreamEvent};
///
/// struct StderrLogger;
///
/// impl ChatLogger for StderrLogger {
///     fn log_frame(&self, conversation_id: &str, payload: &str) {
///         eprintln!("[{conversation_id}] frame: {payload}");
///     }
///
///     fn log_stream_event(&self, conversation_id: &str, event: &StreamEvent) {
///         eprintln!("[{conversation_id}] event: {}", event.kind());
///     }
///
///     fn log_terminal(&self, conversation_id: &str, state: SessionState) {
///         eprintln!("[{conversation_id}] session ended: {state}");
///     }
///
///     fn log_commit(&self, conversation_id: &str, message: &Message) {
///         eprintln!("[{conversation_id}] committed {} message {}", message.role, message.id);
///     }
/// }
/// ```
pub trait ChatLogger: Send + Sync {
    /// Log the payload of a frame as it came off the wire.
    fn log_frame(&self, conversation_id: &str, payload: &str);

    /// Log an event after classification, before the session applies it.
    ///
    /// Unrecognized events are logged here even though the session drops them.
    fn log_stream_event(&self, conversation_id: &str, event: &StreamEvent);

    /// Log a session reaching its terminal state.
    fn log_terminal(&self, conversation_id: &str, state: SessionState);

    /// Log a message appended to a conversation's durable history.
    fn log_commit(&self, conversation_id: &str, message: &Message);
}
