//! Chat application module for interactive conversations with the agent.
//!
//! This module provides the pieces of the streaming REPL built on top of the
//! conversation registry. It supports:
//!
//! - Streaming responses with real-time token display
//! - Running-tool indicators while the agent works
//! - Slash commands for managing conversations
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing

mod commands;
mod config;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ORG_ID_ENV};
