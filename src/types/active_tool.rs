use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool the agent is currently running.
///
/// Active tools live on the stream session's tool stack between a
/// `tool_start` and its matching `tool_end`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveTool {
    /// The tool's name.
    pub name: String,

    /// The arguments the tool was started with.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActiveTool {
    /// Creates a new ActiveTool.
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}
