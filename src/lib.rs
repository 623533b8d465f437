// Public modules
pub mod chat;
pub mod classify;
pub mod client;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod render;
pub mod session;
pub mod sse;
pub mod types;
pub mod utils;

mod chat_logger;
mod observability;

// Re-exports
pub use chat_logger::ChatLogger;
pub use classify::{Classified, DONE_SENTINEL, classify};
pub use client::{AgentClient, ConversationBackend};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use reconcile::{ERROR_PREFIX, commit, reconcile, user_message};
pub use registry::{CancelHandle, ConversationRegistry};
pub use render::{PlainTextRenderer, Renderer};
pub use session::{Delta, Outcome, SessionState, StreamSession};
pub use sse::{ByteStream, FrameDecoder, FrameStream, frames};
pub use types::*;
