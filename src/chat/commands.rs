//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to manage conversations without sending messages to the
//! agent.

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Start a new conversation.
    New,

    /// Switch to an existing conversation.
    Switch(String),

    /// List the organization's conversations.
    List,

    /// Delete a conversation.
    Delete(String),

    /// Print the active conversation's history.
    History,

    /// Show the tools the agent is running.
    Tools,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use codecircle::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert!(parse_command("/switch c-1").is_some());
/// assert!(parse_command("why is checkout failing?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" => ChatCommand::New,
        "switch" | "open" => match argument {
            Some(id) => ChatCommand::Switch(id.to_string()),
            None => ChatCommand::Invalid("/switch requires a conversation id".to_string()),
        },
        "list" | "ls" => ChatCommand::List,
        "delete" | "rm" => match argument {
            Some(id) => ChatCommand::Delete(id.to_string()),
            None => ChatCommand::Invalid("/delete requires a conversation id".to_string()),
        },
        "history" => ChatCommand::History,
        "tools" => ChatCommand::Tools,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new                   Start a new conversation
  /switch <id>           Switch to an existing conversation
  /list                  List conversations
  /delete <id>           Delete a conversation
  /history               Show the active conversation
  /tools                 Show tools the agent is running
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl+C while the agent is responding to cancel the response."#
}
