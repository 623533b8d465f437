//! The conversation registry: which conversation is active, and the one
//! stream session allowed to run at a time.
//!
//! The registry owns the only [`StreamSession`] in the process.  Starting a
//! send, switching conversations, starting a new one and deleting the active
//! one all cancel that session first, so a superseded response can never
//! write into any history.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::chat_logger::ChatLogger;
use crate::client::ConversationBackend;
use crate::error::{Error, Result};
use crate::reconcile;
use crate::render::Renderer;
use crate::session::{Delta, SessionState, StreamSession};
use crate::sse::frames;
use crate::types::{ActiveTool, Conversation, Message};

/// Cancels whatever session the registry is running, from any thread.
///
/// Cancellation is cooperative: the session notices at its next read.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl CancelHandle {
    /// Requests cancellation of the current session.
    ///
    /// Returns false when no session was running or it was already cancelled.
    pub fn cancel(&self) -> bool {
        match self.lock().as_ref() {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Returns true while a session is registered.
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn set(&self, token: Option<CancellationToken>) {
        *self.lock() = token;
    }

    // A panic elsewhere must not stop Ctrl+C from cancelling.
    fn lock(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks the conversations of one organization and the active one's history.
pub struct ConversationRegistry<B: ConversationBackend> {
    backend: B,
    org_id: String,
    conversations: Vec<Conversation>,
    active: Option<Conversation>,
    session: Option<StreamSession>,
    cancel_handle: CancelHandle,
    logger: Option<Arc<dyn ChatLogger>>,
}

impl<B: ConversationBackend> ConversationRegistry<B> {
    /// Creates an empty registry for `org_id`.
    pub fn new(backend: B, org_id: impl Into<String>) -> Self {
        Self {
            backend,
            org_id: org_id.into(),
            conversations: Vec::new(),
            active: None,
            session: None,
            cancel_handle: CancelHandle::default(),
            logger: None,
        }
    }

    /// Attaches a logger to the registry and every session it starts.
    pub fn with_logger(mut self, logger: Arc<dyn ChatLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// Known conversations, most recently updated first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// The active conversation, with its committed history.
    pub fn active(&self) -> Option<&Conversation> {
        self.active.as_ref()
    }

    /// Committed messages of the active conversation.
    pub fn history(&self) -> &[Message] {
        self.active
            .as_ref()
            .map(|conversation| conversation.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Response text streamed so far; empty when nothing is streaming.
    pub fn draft(&self) -> &str {
        self.session
            .as_ref()
            .map(StreamSession::draft)
            .unwrap_or("")
    }

    /// Tools the agent is running right now, oldest first.
    pub fn active_tools(&self) -> &[ActiveTool] {
        self.session
            .as_ref()
            .map(StreamSession::active_tools)
            .unwrap_or(&[])
    }

    pub fn is_streaming(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(StreamSession::is_streaming)
    }

    /// State of the running session, if there is one.
    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(StreamSession::state)
    }

    /// A handle that cancels the running session from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    /// Reloads the conversation list from the backend.
    pub async fn refresh(&mut self) -> Result<&[Conversation]> {
        self.conversations = self.backend.list_conversations(&self.org_id).await?;
        Ok(&self.conversations)
    }

    /// Creates a conversation and makes it active.
    pub async fn start_new_conversation(&mut self) -> Result<&Conversation> {
        self.cancel();
        let conversation = self.backend.create_conversation(&self.org_id).await?;
        self.conversations.retain(|c| c.id != conversation.id);
        self.conversations.insert(0, conversation.clone());
        Ok(self.active.insert(conversation))
    }

    /// Makes the conversation `conversation_id` active, loading its history.
    ///
    /// Any running session is cancelled before the history is fetched.  On
    /// error the previously active conversation stays active.
    pub async fn switch_conversation(&mut self, conversation_id: &str) -> Result<&Conversation> {
        self.cancel();
        let conversation = self.backend.get_conversation(conversation_id).await?;
        if let Some(entry) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation.id)
        {
            entry.title.clone_from(&conversation.title);
            entry.updated_at = conversation.updated_at;
        }
        Ok(self.active.insert(conversation))
    }

    /// Deletes a conversation; deleting the active one cancels its session
    /// and leaves no conversation active.
    ///
    /// On error nothing changes locally and any running session continues.
    pub async fn delete_conversation(&mut self, conversation_id: &str) -> Result<()> {
        self.backend.delete_conversation(conversation_id).await?;
        self.conversations.retain(|c| c.id != conversation_id);
        if self
            .active
            .as_ref()
            .is_some_and(|conversation| conversation.id == conversation_id)
        {
            self.cancel();
            self.active = None;
        }
        Ok(())
    }

    /// Cancels the running session.
    ///
    /// Returns true if a session was running.  The user message of the
    /// cancelled send stays in history.
    pub fn cancel(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let cancelled = session.cancel().is_some();
        self.settle();
        cancelled
    }

    /// Sends `content` to the active conversation.
    ///
    /// The user message is appended immediately.  Returns the session state
    /// once the response stream is open: `Streaming` normally, `Errored` if
    /// it could not be opened (the error is already in history), or
    /// `Cancelled` if the send was cancelled while connecting.
    pub async fn send_message(&mut self, content: &str) -> Result<SessionState> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::validation(
                "Message content cannot be empty",
                Some("content".to_string()),
            ));
        }
        // No session runs without an active conversation.
        self.cancel();
        let Some(conversation) = self.active.as_mut() else {
            return Err(Error::validation(
                "No active conversation; start or switch to one first",
                None,
            ));
        };
        let conversation_id = conversation.id.clone();
        let message = reconcile::commit_user(conversation, content);
        if let Some(logger) = &self.logger {
            logger.log_commit(&conversation_id, message);
        }
        self.touch(&conversation_id);

        let mut session = StreamSession::new(conversation_id.as_str()).with_logger(self.logger.clone());
        session.start();
        let token = session.cancel_handle();
        self.cancel_handle.set(Some(token.clone()));

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            opened = self.backend.send_message(&conversation_id, content) => Some(opened),
        };
        match opened {
            Some(Ok(bytes)) => session.attach(frames(bytes)),
            Some(Err(err)) => {
                session.fail(&err);
            }
            None => {
                session.cancel();
            }
        }

        let state = session.state();
        self.session = Some(session);
        self.settle();
        Ok(state)
    }

    /// Advances the running session by one UI-observable change.
    ///
    /// The session's outcome is committed as soon as it terminates; `None`
    /// means nothing is streaming.
    pub async fn next_delta(&mut self) -> Option<Delta> {
        let session = self.session.as_mut()?;
        let delta = session.next_delta().await;
        if delta
            .as_ref()
            .is_none_or(|delta| delta.terminal_state().is_some())
        {
            self.settle();
        }
        delta
    }

    /// Runs the current session to completion, rendering its deltas.
    ///
    /// Returns the terminal state, or `None` if nothing was streaming.
    pub async fn drive(&mut self, renderer: &mut dyn Renderer) -> Option<SessionState> {
        let session = self.session.as_mut()?;
        let state = session.run(renderer).await;
        self.settle();
        Some(state)
    }

    /// Commits a terminated session's outcome and retires the session.
    fn settle(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.is_terminal() {
            return;
        }
        let mut committed = None;
        if let Some(conversation) = self.active.as_mut() {
            let conversation_id = conversation.id.clone();
            if let Some(message) = reconcile::commit(conversation, session) {
                if let Some(logger) = &self.logger {
                    logger.log_commit(&conversation_id, message);
                }
                committed = Some(conversation_id);
            }
        }
        self.session = None;
        self.cancel_handle.set(None);
        if let Some(conversation_id) = committed {
            self.touch(&conversation_id);
        }
    }

    /// Moves a conversation's list entry to the front with the active
    /// conversation's timestamp.
    fn touch(&mut self, conversation_id: &str) {
        let Some(updated_at) = self
            .active
            .as_ref()
            .filter(|conversation| conversation.id == conversation_id)
            .map(|conversation| conversation.updated_at)
        else {
            return;
        };
        if let Some(index) = self
            .conversations
            .iter()
            .position(|c| c.id == conversation_id)
        {
            let mut entry = self.conversations.remove(index);
            entry.updated_at = updated_at;
            self.conversations.insert(0, entry);
        }
    }
}

impl<B: ConversationBackend> std::fmt::Debug for ConversationRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationRegistry")
            .field("org_id", &self.org_id)
            .field("conversations", &self.conversations.len())
            .field("active", &self.active.as_ref().map(|c| c.id.as_str()))
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::ByteStream;
    use crate::types::MessageRole;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;

    /// Answers every send with the same scripted body.
    struct ScriptedBackend {
        body: Vec<&'static str>,
        fail_delete: bool,
    }

    #[async_trait]
    impl ConversationBackend for ScriptedBackend {
        async fn create_conversation(&self, _org_id: &str) -> Result<Conversation> {
            Ok(Conversation::new("c-new"))
        }

        async fn list_conversations(&self, _org_id: &str) -> Result<Vec<Conversation>> {
            Ok(vec![
                Conversation::new("c-1").with_title("checkout outage"),
                Conversation::new("c-2"),
            ])
        }

        async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
            Ok(Conversation::new(conversation_id))
        }

        async fn delete_conversation(&self, _conversation_id: &str) -> Result<()> {
            if self.fail_delete {
                return Err(Error::internal_server("delete failed"));
            }
            Ok(())
        }

        async fn send_message(&self, _conversation_id: &str, _content: &str) -> Result<ByteStream> {
            let chunks: Vec<Result<Bytes>> = self
                .body
                .iter()
                .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
                .collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn registry(body: Vec<&'static str>) -> ConversationRegistry<ScriptedBackend> {
        ConversationRegistry::new(
            ScriptedBackend {
                body,
                fail_delete: false,
            },
            "org-1",
        )
    }

    #[tokio::test]
    async fn send_requires_active_conversation_and_content() {
        let mut registry = registry(vec![]);
        let err = registry.send_message("hello").await.unwrap_err();
        assert!(err.is_validation());

        registry.start_new_conversation().await.unwrap();
        let err = registry.send_message("   ").await.unwrap_err();
        assert!(err.is_validation());
        assert!(registry.history().is_empty());
    }

    #[tokio::test]
    async fn send_streams_and_commits() {
        let mut registry = registry(vec![
            "data: {\"type\":\"token\",\"content\":\"Hi\"}\n\n",
            "data: {\"type\":\"token\",\"content\":\" there\"}\n\n",
        ]);
        registry.start_new_conversation().await.unwrap();
        assert_eq!(
            registry.send_message(" hello ").await.unwrap(),
            SessionState::Streaming
        );
        assert!(registry.is_streaming());
        assert!(registry.cancel_handle().is_active());
        assert_eq!(registry.history()[0].content, "hello");

        assert_eq!(
            registry.next_delta().await,
            Some(Delta::Text("Hi".to_string()))
        );
        assert_eq!(registry.draft(), "Hi");
        registry.next_delta().await;
        assert_eq!(registry.next_delta().await, Some(Delta::Completed));
        assert_eq!(registry.next_delta().await, None);

        assert!(!registry.is_streaming());
        assert!(!registry.cancel_handle().is_active());
        assert_eq!(registry.draft(), "");
        let history = registry.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[1].content, "Hi there");
    }

    #[tokio::test]
    async fn cancel_handle_stops_the_session() {
        let mut registry = registry(vec!["data: {\"type\":\"token\",\"content\":\"a\"}\n"]);
        registry.start_new_conversation().await.unwrap();
        registry.send_message("q").await.unwrap();
        let handle = registry.cancel_handle();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(registry.next_delta().await, Some(Delta::Cancelled));
        assert_eq!(registry.history().len(), 1);
        assert!(!registry.cancel());
    }

    #[tokio::test]
    async fn new_conversations_go_first() {
        let mut registry = registry(vec![]);
        registry.refresh().await.unwrap();
        registry.start_new_conversation().await.unwrap();
        let ids: Vec<_> = registry
            .conversations()
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c-new", "c-1", "c-2"]);
    }

    #[tokio::test]
    async fn sending_moves_conversation_to_front() {
        let mut registry = registry(vec![]);
        registry.refresh().await.unwrap();
        registry.switch_conversation("c-2").await.unwrap();
        registry.send_message("ping").await.unwrap();
        assert_eq!(registry.conversations()[0].id, "c-2");
    }

    #[tokio::test]
    async fn deleting_active_conversation_clears_it() {
        let mut registry = registry(vec!["data: {\"type\":\"token\",\"content\":\"a\"}\n"]);
        registry.refresh().await.unwrap();
        registry.switch_conversation("c-1").await.unwrap();
        registry.send_message("q").await.unwrap();
        registry.delete_conversation("c-1").await.unwrap();
        assert!(registry.active().is_none());
        assert!(!registry.is_streaming());
        assert_eq!(registry.conversations().len(), 1);
    }

    #[tokio::test]
    async fn failed_delete_keeps_the_response_streaming() {
        let mut registry = ConversationRegistry::new(
            ScriptedBackend {
                body: vec!["data: {\"type\":\"token\",\"content\":\"partial\"}\n"],
                fail_delete: true,
            },
            "org-1",
        );
        registry.refresh().await.unwrap();
        registry.switch_conversation("c-1").await.unwrap();
        registry.send_message("q").await.unwrap();
        assert_eq!(
            registry.next_delta().await,
            Some(Delta::Text("partial".to_string()))
        );

        let err = registry.delete_conversation("c-1").await.unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(registry.session_state(), Some(SessionState::Streaming));
        assert_eq!(registry.draft(), "partial");
        assert!(registry.cancel_handle().is_active());
        assert_eq!(registry.active().map(|c| c.id.as_str()), Some("c-1"));
        assert_eq!(registry.conversations().len(), 2);

        assert_eq!(registry.next_delta().await, Some(Delta::Completed));
        assert_eq!(registry.session_state(), None);
        assert_eq!(registry.history()[1].content, "partial");
    }

    #[tokio::test]
    async fn registry_reports_its_scope() {
        let mut registry = registry(vec![]);
        assert_eq!(registry.org_id(), "org-1");
        let listed = registry.backend().list_conversations("org-1").await.unwrap();
        assert_eq!(listed[0].label(), "checkout outage");
        registry.refresh().await.unwrap();
        assert_eq!(registry.conversations()[0].label(), "checkout outage");
        assert_eq!(registry.conversations()[1].label(), "c-2");
        assert_eq!(registry.session_state(), None);
    }

    #[test]
    fn cancel_handle_survives_a_poisoned_lock() {
        let handle = CancelHandle::default();
        let token = CancellationToken::new();
        handle.set(Some(token.clone()));
        let poisoner = handle.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.current.lock().unwrap();
            panic!("poison the slot");
        })
        .join();
        assert!(handle.current.is_poisoned());
        assert!(handle.is_active());
        assert!(handle.cancel());
        assert!(token.is_cancelled());
        handle.set(None);
        assert!(!handle.is_active());
    }
}
