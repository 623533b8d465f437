//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for connecting to the agent.

use std::env;

use arrrg_derive::CommandLine;

use crate::client::{AGENT_URL_ENV, DEFAULT_AGENT_URL};

/// Environment variable naming the organization whose conversations are shown.
pub const ORG_ID_ENV: &str = "CODECIRCLE_ORG_ID";

/// Command-line arguments for the codecircle-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the debugging agent.
    #[arrrg(optional, "Agent base URL (default: $CODECIRCLE_AGENT_URL or http://localhost:8100)", "URL")]
    pub agent_url: Option<String>,

    /// Organization that owns the conversations.
    #[arrrg(optional, "Organization id (default: $CODECIRCLE_ORG_ID)", "ORG")]
    pub org: Option<String>,

    /// Conversation to open at startup.
    #[arrrg(optional, "Conversation to resume instead of starting a new one", "ID")]
    pub conversation: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Base URL of the debugging agent.
    pub agent_url: String,

    /// Organization whose conversations are listed and created.
    pub org_id: Option<String>,

    /// Conversation to resume at startup; `None` starts a new one.
    pub conversation_id: Option<String>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig from the environment.
    ///
    /// Defaults:
    /// - Agent URL: `$CODECIRCLE_AGENT_URL`, else http://localhost:8100
    /// - Organization: `$CODECIRCLE_ORG_ID`, else none
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            agent_url: env::var(AGENT_URL_ENV).unwrap_or_else(|_| DEFAULT_AGENT_URL.to_string()),
            org_id: env::var(ORG_ID_ENV).ok().filter(|org| !org.trim().is_empty()),
            conversation_id: None,
            use_color: true,
        }
    }

    /// Sets the agent URL.
    pub fn with_agent_url(mut self, agent_url: impl Into<String>) -> Self {
        self.agent_url = agent_url.into();
        self
    }

    /// Sets the organization id.
    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Sets the conversation to resume.
    pub fn with_conversation(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChatArgs> for ChatConfig {
    fn from(args: ChatArgs) -> Self {
        let defaults = ChatConfig::new();
        ChatConfig {
            agent_url: args.agent_url.unwrap_or(defaults.agent_url),
            org_id: args.org.or(defaults.org_id),
            conversation_id: args.conversation,
            use_color: !args.no_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_args_custom() {
        let args = ChatArgs {
            agent_url: Some("http://agent:9000".to_string()),
            org: Some("org-7".to_string()),
            conversation: Some("c-1".to_string()),
            no_color: true,
        };
        let config = ChatConfig::from(args);
        assert_eq!(config.agent_url, "http://agent:9000");
        assert_eq!(config.org_id.as_deref(), Some("org-7"));
        assert_eq!(config.conversation_id.as_deref(), Some("c-1"));
        assert!(!config.use_color);
    }

    #[test]
    fn config_from_args_defaults() {
        let config = ChatConfig::from(ChatArgs::default());
        assert!(config.use_color);
        assert!(config.conversation_id.is_none());
        assert!(!config.agent_url.is_empty());
    }

    #[test]
    fn config_builder_pattern() {
        let config = ChatConfig::new()
            .with_agent_url("http://127.0.0.1:8100")
            .with_org_id("org-1")
            .with_conversation(Some("c-9".to_string()))
            .without_color();
        assert_eq!(config.agent_url, "http://127.0.0.1:8100");
        assert_eq!(config.org_id.as_deref(), Some("org-1"));
        assert_eq!(config.conversation_id.as_deref(), Some("c-9"));
        assert!(!config.use_color);
    }
}
