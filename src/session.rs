//! Stream session: one in-flight exchange with the debugging agent.
//!
//! A session owns the frame stream of one send, the draft text accumulated
//! from token events, and the stack of tools the agent is currently running.
//! It moves `Idle -> Streaming -> {Completed, Cancelled, Errored}` and reaches
//! a terminal state exactly once; anything observed afterwards is ignored.
//!
//! Cancellation is cooperative.  Every session carries a
//! [`CancellationToken`]; the consumption loop races each transport read
//! against it and checks it again before applying a decoded frame.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::chat_logger::ChatLogger;
use crate::classify::classify;
use crate::observability::{
    SESSION_CANCELLED, SESSION_COMPLETED, SESSION_EMPTY, SESSION_ERRORED,
    SESSION_IMPLICIT_COMPLETIONS, STREAM_DURATION, STREAM_ERRORS, STREAM_EVENTS, STREAM_TTFB,
    STREAM_UNRECOGNIZED,
};
use crate::render::Renderer;
use crate::sse::FrameStream;
use crate::Error;
use crate::types::{ActiveTool, StreamEvent, ToolCall};

/// Lifecycle state of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not yet sending.
    Idle,
    /// Consuming the agent's response stream.
    Streaming,
    /// The response finished, by a `done` event or by the stream closing.
    Completed,
    /// The user abandoned the response.
    Cancelled,
    /// The stream could not be opened or read.
    Errored,
}

impl SessionState {
    /// Returns true for states no transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Errored
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
            SessionState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// What a terminated session leaves behind for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The agent produced a response.
    Completed {
        /// Final response text.
        content: String,
        /// Tool call records reported by the `done` event.
        tool_calls: Option<Vec<ToolCall>>,
    },
    /// The stream closed before any text arrived.
    Empty,
    /// The session was cancelled.
    Cancelled,
    /// The stream failed.
    Errored {
        /// Human-readable description of the failure.
        message: String,
    },
}

impl Outcome {
    /// The terminal state this outcome belongs to.
    pub fn state(&self) -> SessionState {
        match self {
            Outcome::Completed { .. } | Outcome::Empty => SessionState::Completed,
            Outcome::Cancelled => SessionState::Cancelled,
            Outcome::Errored { .. } => SessionState::Errored,
        }
    }
}

/// A UI-observable change produced while streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Text was appended to the draft.
    Text(String),
    /// A tool was pushed onto the active-tool stack.
    ToolStarted(ActiveTool),
    /// The most recently started tool was popped.
    ToolFinished(ActiveTool),
    /// The session completed.
    Completed,
    /// The session was cancelled.
    Cancelled,
    /// The session failed with the given description.
    Failed(String),
}

impl Delta {
    /// The terminal state this delta announces, if any.
    pub fn terminal_state(&self) -> Option<SessionState> {
        match self {
            Delta::Completed => Some(SessionState::Completed),
            Delta::Cancelled => Some(SessionState::Cancelled),
            Delta::Failed(_) => Some(SessionState::Errored),
            _ => None,
        }
    }
}

/// One request/response exchange with the agent.
pub struct StreamSession {
    conversation_id: String,
    state: SessionState,
    draft: String,
    tools: Vec<ActiveTool>,
    outcome: Option<Outcome>,
    frames: Option<FrameStream>,
    cancel: CancellationToken,
    started: Option<Instant>,
    saw_frame: bool,
    logger: Option<Arc<dyn ChatLogger>>,
}

impl StreamSession {
    /// Creates an idle session for the given conversation.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            state: SessionState::Idle,
            draft: String::new(),
            tools: Vec::new(),
            outcome: None,
            frames: None,
            cancel: CancellationToken::new(),
            started: None,
            saw_frame: false,
            logger: None,
        }
    }

    /// Attaches a logger.
    pub fn with_logger(mut self, logger: Option<Arc<dyn ChatLogger>>) -> Self {
        self.logger = logger;
        self
    }

    /// The conversation this session answers into.
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true while the response is being consumed.
    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    /// Returns true once the session has terminated.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The response text received so far.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Tools currently running, oldest first.
    pub fn active_tools(&self) -> &[ActiveTool] {
        &self.tools
    }

    /// A handle that cancels this session from elsewhere.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Moves an idle session into `Streaming` with an empty draft and tool stack.
    ///
    /// Returns false if the session was not idle.
    pub fn start(&mut self) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }
        self.state = SessionState::Streaming;
        self.draft.clear();
        self.tools.clear();
        self.started = Some(Instant::now());
        true
    }

    /// Hands the session the frame stream to consume.
    ///
    /// Ignored unless the session is streaming.
    pub fn attach(&mut self, frames: FrameStream) {
        if self.is_streaming() {
            self.frames = Some(frames);
        }
    }

    /// Applies one classified event.
    ///
    /// Returns the resulting UI delta, or `None` when the event changes
    /// nothing observable (unrecognized events, `tool_end` on an empty stack,
    /// anything after termination).
    pub fn apply(&mut self, event: StreamEvent) -> Option<Delta> {
        if !self.is_streaming() {
            return None;
        }
        STREAM_EVENTS.click();
        match event {
            StreamEvent::Token { content } => {
                self.draft.push_str(&content);
                Some(Delta::Text(content))
            }
            StreamEvent::ToolStart { name, args } => {
                let tool = ActiveTool::new(name, args);
                self.tools.push(tool.clone());
                Some(Delta::ToolStarted(tool))
            }
            StreamEvent::ToolEnd => self.tools.pop().map(Delta::ToolFinished),
            StreamEvent::Done {
                content,
                tool_calls,
            } => {
                let content = match content {
                    Some(content) if !content.is_empty() => content,
                    _ => std::mem::take(&mut self.draft),
                };
                SESSION_COMPLETED.click();
                self.terminate(Outcome::Completed {
                    content,
                    tool_calls,
                });
                Some(Delta::Completed)
            }
            StreamEvent::Unrecognized { .. } => {
                STREAM_UNRECOGNIZED.click();
                None
            }
        }
    }

    /// Handles the stream closing.
    ///
    /// Without a prior `done`, a non-empty draft becomes the response and an
    /// empty one is dropped.
    pub fn close(&mut self) -> Option<Delta> {
        if !self.is_streaming() {
            return None;
        }
        if self.draft.is_empty() {
            SESSION_EMPTY.click();
            self.terminate(Outcome::Empty);
        } else {
            SESSION_IMPLICIT_COMPLETIONS.click();
            let content = std::mem::take(&mut self.draft);
            self.terminate(Outcome::Completed {
                content,
                tool_calls: None,
            });
        }
        Some(Delta::Completed)
    }

    /// Handles a transport failure.
    pub fn fail(&mut self, error: &Error) -> Option<Delta> {
        if !self.is_streaming() {
            return None;
        }
        STREAM_ERRORS.click();
        SESSION_ERRORED.click();
        let message = error.to_string();
        self.terminate(Outcome::Errored {
            message: message.clone(),
        });
        Some(Delta::Failed(message))
    }

    /// Cancels the session, discarding the draft and the tool stack.
    pub fn cancel(&mut self) -> Option<Delta> {
        if self.is_terminal() {
            return None;
        }
        self.cancel.cancel();
        SESSION_CANCELLED.click();
        self.draft.clear();
        self.tools.clear();
        self.terminate(Outcome::Cancelled);
        Some(Delta::Cancelled)
    }

    /// Removes the terminal outcome; later calls return `None`.
    pub fn take_outcome(&mut self) -> Option<Outcome> {
        self.outcome.take()
    }

    pub(crate) fn clear_transient(&mut self) {
        self.draft.clear();
        self.tools.clear();
    }

    fn terminate(&mut self, outcome: Outcome) {
        self.state = outcome.state();
        self.outcome = Some(outcome);
        // Dropping the stream abandons the transport read.
        self.frames = None;
        if let Some(started) = self.started {
            STREAM_DURATION.add(started.elapsed().as_secs_f64());
        }
        if let Some(logger) = &self.logger {
            logger.log_terminal(&self.conversation_id, self.state);
        }
    }

    /// Consumes frames until one produces a delta.
    ///
    /// Returns `None` once the session is terminal (or was never given a
    /// stream).  The delta that terminates the session is returned before
    /// `None`.
    pub async fn next_delta(&mut self) -> Option<Delta> {
        loop {
            if !self.is_streaming() {
                return None;
            }
            if self.cancel.is_cancelled() {
                return self.cancel();
            }

            let cancel = self.cancel.clone();
            let next = {
                let frames = self.frames.as_mut()?;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = frames.next() => Some(next),
                }
            };
            let Some(next) = next else {
                return self.cancel();
            };

            match next {
                Some(Ok(payload)) => {
                    self.observe_frame();
                    if self.cancel.is_cancelled() {
                        return self.cancel();
                    }
                    if let Some(logger) = &self.logger {
                        logger.log_frame(&self.conversation_id, &payload);
                    }
                    let Some(classified) = classify(&payload) else {
                        continue;
                    };
                    let event = classified.into_event();
                    if let Some(logger) = &self.logger {
                        logger.log_stream_event(&self.conversation_id, &event);
                    }
                    if let Some(delta) = self.apply(event) {
                        return Some(delta);
                    }
                }
                Some(Err(err)) => return self.fail(&err),
                None => return self.close(),
            }
        }
    }

    /// Drives the session to a terminal state, rendering every delta.
    pub async fn run(&mut self, renderer: &mut dyn Renderer) -> SessionState {
        while let Some(delta) = self.next_delta().await {
            renderer.render_delta(&delta);
            if renderer.should_interrupt() {
                if let Some(delta) = self.cancel() {
                    renderer.render_delta(&delta);
                }
            }
        }
        self.state
    }

    fn observe_frame(&mut self) {
        if !self.saw_frame {
            self.saw_frame = true;
            if let Some(started) = self.started {
                STREAM_TTFB.add(started.elapsed().as_secs_f64());
            }
        }
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("conversation_id", &self.conversation_id)
            .field("state", &self.state)
            .field("draft", &self.draft)
            .field("tools", &self.tools)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::{frames, ByteStream};
    use bytes::Bytes;
    use futures::stream;

    fn streaming() -> StreamSession {
        let mut session = StreamSession::new("c-1");
        assert!(session.start());
        session
    }

    fn body(frames_text: &[&str]) -> FrameStream {
        let chunks: Vec<crate::Result<Bytes>> = frames_text
            .iter()
            .map(|f| Ok(Bytes::from(format!("data: {f}\n\n"))))
            .collect();
        let bytes: ByteStream = Box::pin(stream::iter(chunks));
        frames(bytes)
    }

    #[test]
    fn tokens_accumulate_into_draft() {
        let mut session = streaming();
        assert_eq!(
            session.apply(StreamEvent::token("Hi")),
            Some(Delta::Text("Hi".to_string()))
        );
        session.apply(StreamEvent::token(" there"));
        assert_eq!(session.draft(), "Hi there");
    }

    #[test]
    fn tool_stack_is_lifo() {
        let mut session = streaming();
        session.apply(StreamEvent::tool_start("search"));
        session.apply(StreamEvent::tool_start("grep"));
        assert_eq!(session.active_tools().len(), 2);
        let Some(Delta::ToolFinished(tool)) = session.apply(StreamEvent::ToolEnd) else {
            panic!("expected a finished tool");
        };
        assert_eq!(tool.name, "grep");
        assert_eq!(session.active_tools()[0].name, "search");
        session.apply(StreamEvent::ToolEnd);
        assert_eq!(session.apply(StreamEvent::ToolEnd), None);
        assert!(session.active_tools().is_empty());
        assert!(session.is_streaming());
    }

    #[test]
    fn done_prefers_explicit_content() {
        let mut session = streaming();
        session.apply(StreamEvent::token("draft"));
        session.apply(StreamEvent::done(Some("final".to_string())));
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(
            session.take_outcome(),
            Some(Outcome::Completed {
                content: "final".to_string(),
                tool_calls: None,
            })
        );
    }

    #[test]
    fn done_with_empty_content_uses_draft() {
        let mut session = streaming();
        session.apply(StreamEvent::token("draft"));
        session.apply(StreamEvent::done(Some(String::new())));
        assert_eq!(
            session.take_outcome(),
            Some(Outcome::Completed {
                content: "draft".to_string(),
                tool_calls: None,
            })
        );
    }

    #[test]
    fn only_one_terminal_transition() {
        let mut session = streaming();
        session.apply(StreamEvent::token("x"));
        assert_eq!(session.apply(StreamEvent::done(None)), Some(Delta::Completed));
        assert_eq!(session.close(), None);
        assert_eq!(session.cancel(), None);
        assert_eq!(session.fail(&Error::streaming("late", None)), None);
        assert_eq!(session.apply(StreamEvent::token("late")), None);
        assert!(session.take_outcome().is_some());
        assert!(session.take_outcome().is_none());
    }

    #[test]
    fn close_without_done() {
        let mut session = streaming();
        session.apply(StreamEvent::token("Hi"));
        session.apply(StreamEvent::token(" there"));
        assert_eq!(session.close(), Some(Delta::Completed));
        assert_eq!(
            session.take_outcome(),
            Some(Outcome::Completed {
                content: "Hi there".to_string(),
                tool_calls: None,
            })
        );

        let mut empty = streaming();
        empty.close();
        assert_eq!(empty.state(), SessionState::Completed);
        assert_eq!(empty.take_outcome(), Some(Outcome::Empty));
    }

    #[test]
    fn cancel_discards_draft() {
        let mut session = streaming();
        let handle = session.cancel_handle();
        session.apply(StreamEvent::token("a"));
        session.apply(StreamEvent::tool_start("grep"));
        assert_eq!(session.cancel(), Some(Delta::Cancelled));
        assert!(handle.is_cancelled());
        assert_eq!(session.draft(), "");
        assert!(session.active_tools().is_empty());
        assert_eq!(session.take_outcome(), Some(Outcome::Cancelled));
    }

    #[test]
    fn idle_session_ignores_events() {
        let mut session = StreamSession::new("c-1");
        assert_eq!(session.apply(StreamEvent::token("x")), None);
        assert_eq!(session.close(), None);
        assert!(session.start());
        assert!(!session.start());
    }

    #[tokio::test]
    async fn next_delta_drives_frames() {
        let mut session = streaming();
        session.attach(body(&[
            r#"{"type":"token","content":"Checking"}"#,
            r#"{"type":"heartbeat"}"#,
            r#"{"type":"tool_start","tool":"query_logs"}"#,
            r#"{"type":"tool_end"}"#,
            r#"{"type":"done"}"#,
            r#"{"type":"token","content":"after"}"#,
        ]));

        assert_eq!(
            session.next_delta().await,
            Some(Delta::Text("Checking".to_string()))
        );
        assert!(matches!(
            session.next_delta().await,
            Some(Delta::ToolStarted(tool)) if tool.name == "query_logs"
        ));
        assert!(matches!(
            session.next_delta().await,
            Some(Delta::ToolFinished(_))
        ));
        assert_eq!(session.next_delta().await, Some(Delta::Completed));
        assert_eq!(session.next_delta().await, None);
        assert_eq!(
            session.take_outcome(),
            Some(Outcome::Completed {
                content: "Checking".to_string(),
                tool_calls: None,
            })
        );
    }

    #[tokio::test]
    async fn transport_error_ends_in_errored() {
        let mut session = streaming();
        let bytes: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"data: partial\n")),
            Err(Error::streaming("connection reset", None)),
        ]));
        session.attach(frames(bytes));
        assert_eq!(
            session.next_delta().await,
            Some(Delta::Text("partial".to_string()))
        );
        assert!(matches!(session.next_delta().await, Some(Delta::Failed(msg)) if msg.contains("connection reset")));
        assert_eq!(session.state(), SessionState::Errored);
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_read() {
        let mut session = streaming();
        let bytes: ByteStream = Box::pin(stream::pending::<crate::Result<Bytes>>());
        session.attach(frames(bytes));
        let handle = session.cancel_handle();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            handle.cancel();
        });
        assert_eq!(session.next_delta().await, Some(Delta::Cancelled));
        assert_eq!(session.state(), SessionState::Cancelled);
    }
}
