//! Interactive chat with the CodeCircle debugging agent.
//!
//! This binary provides a streaming REPL over the agent's conversation API.
//!
//! # Usage
//!
//! ```bash
//! # Start a new conversation for an organization
//! codecircle-chat --org org-1
//!
//! # Resume a conversation on a remote agent
//! codecircle-chat --agent-url http://agent:8100 --org org-1 --conversation c-42
//!
//! # Disable colors (useful for piping output)
//! codecircle-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/new` - Start a new conversation
//! - `/switch <id>` - Switch conversations
//! - `/list` - List conversations
//! - `/quit` - Exit the application
//!
//! Ctrl+C while the agent is responding cancels the response.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use time::format_description::well_known::Rfc3339;

use codecircle::chat::{
    ChatArgs, ChatCommand, ChatConfig, ORG_ID_ENV, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use codecircle::{
    AgentClient, ConversationRegistry, ERROR_PREFIX, MessageRole, SessionState,
};

type Registry = ConversationRegistry<AgentClient>;

/// Main entry point for the codecircle-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("codecircle-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    let Some(org_id) = config.org_id.clone() else {
        eprintln!("No organization given; pass --org or set {ORG_ID_ENV}.");
        std::process::exit(1);
    };

    let client = AgentClient::new(Some(config.agent_url.clone()))?;
    let mut registry = ConversationRegistry::new(client, org_id);

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let mut renderer =
        PlainTextRenderer::with_color(config.use_color).with_interrupt(interrupted.clone());
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C cancels the in-flight response, even while it is still connecting.
    let interrupted_clone = interrupted.clone();
    let cancel = registry.cancel_handle();
    ctrlc::set_handler(move || {
        if cancel.cancel() {
            interrupted_clone.store(true, Ordering::Relaxed);
        }
    })?;

    println!("CodeCircle Chat (agent: {})", config.agent_url);
    if let Err(err) = registry.refresh().await {
        renderer.print_error(&format!("Failed to list conversations: {err}"));
    }
    let opened = match &config.conversation_id {
        Some(id) => registry.switch_conversation(id).await.map(|c| c.label().to_string()),
        None => registry
            .start_new_conversation()
            .await
            .map(|c| c.label().to_string()),
    };
    match opened {
        Ok(label) => renderer.print_info(&format!("Conversation: {label}")),
        Err(err) => renderer.print_error(&format!("Failed to open a conversation: {err}")),
    }
    if config.conversation_id.is_some() {
        print_history(&registry, &mut renderer);
    }
    println!("Type /help for commands, /quit to exit\n");

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {line}");
                            }
                        }
                        ChatCommand::New => match registry.start_new_conversation().await {
                            Ok(conversation) => {
                                let id = conversation.id.clone();
                                renderer.print_info(&format!("Started conversation {id}"));
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Switch(id) => match registry.switch_conversation(&id).await {
                            Ok(conversation) => {
                                let label = conversation.label().to_string();
                                renderer.print_info(&format!("Switched to {label}"));
                                print_history(&registry, &mut renderer);
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::List => match registry.refresh().await {
                            Ok(_) => print_conversations(&registry),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Delete(id) => match registry.delete_conversation(&id).await {
                            Ok(()) => {
                                renderer.print_info(&format!("Deleted conversation {id}"));
                                if registry.active().is_none() {
                                    renderer.print_info("No active conversation; use /new or /switch.");
                                }
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::History => print_history(&registry, &mut renderer),
                        ChatCommand::Tools => print_tools(&registry),
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to the agent
                match registry.send_message(line).await {
                    Ok(SessionState::Streaming) => {
                        println!("Agent:");
                        registry.drive(&mut renderer).await;
                    }
                    Ok(SessionState::Errored) => {
                        if let Some(message) = registry.history().last() {
                            let content = message.content.as_str();
                            renderer.print_error(content.strip_prefix(ERROR_PREFIX).unwrap_or(content));
                        }
                    }
                    Ok(SessionState::Cancelled) => renderer.print_interrupted(),
                    Ok(_) => {}
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

fn print_history(registry: &Registry, renderer: &mut PlainTextRenderer) {
    if registry.history().is_empty() {
        println!("    (no messages)");
        return;
    }
    for message in registry.history() {
        renderer.print_message(message);
    }
}

fn print_conversations(registry: &Registry) {
    if registry.conversations().is_empty() {
        println!("    (no conversations)");
        return;
    }
    let active = registry.active().map(|c| c.id.as_str());
    for conversation in registry.conversations() {
        let marker = if Some(conversation.id.as_str()) == active {
            "*"
        } else {
            " "
        };
        let updated = conversation
            .updated_at
            .and_then(|at| at.format(&Rfc3339).ok())
            .unwrap_or_else(|| "-".to_string());
        match &conversation.title {
            Some(title) => println!("  {marker} {}  {updated}  {title}", conversation.id),
            None => println!("  {marker} {}  {updated}", conversation.id),
        }
    }
}

fn print_tools(registry: &Registry) {
    let running = registry.active_tools();
    if !running.is_empty() {
        println!("    Running tools:");
        for tool in running {
            println!("      - {}", tool.name);
        }
        return;
    }
    let last_calls = registry
        .history()
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant)
        .and_then(|m| m.tool_calls.as_ref());
    match last_calls {
        Some(calls) if !calls.is_empty() => {
            println!("    Tools used in the last response:");
            for call in calls {
                let status = if call.is_resolved() { "done" } else { "pending" };
                println!("      - {} ({status})", call.name);
            }
        }
        _ => println!("    No tools running."),
    }
}
