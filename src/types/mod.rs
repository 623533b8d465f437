// Public modules
pub mod active_tool;
pub mod conversation;
pub mod message;
pub mod stream_event;
pub mod tool_call;

// Re-exports
pub use active_tool::ActiveTool;
pub use conversation::Conversation;
pub use message::{Message, MessageRole};
pub use stream_event::StreamEvent;
pub use tool_call::ToolCall;
