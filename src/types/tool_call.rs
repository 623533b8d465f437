use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation recorded on an assistant message.
///
/// A ToolCall is pending until its result is recorded, and then resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool that was invoked.
    #[serde(alias = "tool")]
    pub name: String,

    /// The arguments the agent passed to the tool.
    #[serde(default, alias = "arguments", alias = "input")]
    pub args: Map<String, Value>,

    /// The tool's output, present only once the tool has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCall {
    /// Creates a pending tool call.
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
            result: None,
        }
    }

    /// Returns true once the tool's result is known.
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }

    /// Records the tool's result.
    ///
    /// Returns false, leaving the existing result untouched, if the call was already resolved.
    pub fn resolve(&mut self, result: impl Into<String>) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.result = Some(result.into());
        true
    }
}
