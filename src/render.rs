//! Output rendering for streamed agent responses.
//!
//! This module provides the renderer trait the stream session reports its
//! deltas to, and a plain-text implementation for terminals.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::session::Delta;
use crate::types::{ActiveTool, Message, MessageRole};

/// ANSI escape code for dim text (used for tool arguments).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for tool names).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for finished tools).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for bold text (used for role labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// Trait for rendering streaming output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Recording deltas in tests
pub trait Renderer: Send {
    /// Print a chunk of response text.
    ///
    /// This is called once per token, as tokens arrive.
    fn print_text(&mut self, text: &str);

    /// Called when the agent starts running a tool.
    fn start_tool(&mut self, tool: &ActiveTool);

    /// Called when the most recently started tool finishes.
    fn finish_tool(&mut self, tool: &ActiveTool);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);

    /// Called when the stream is interrupted by the user.
    fn print_interrupted(&mut self) {}

    /// Returns true if streaming should be interrupted.
    fn should_interrupt(&self) -> bool {
        false
    }

    /// Dispatches one session delta to the matching method.
    fn render_delta(&mut self, delta: &Delta) {
        match delta {
            Delta::Text(text) => self.print_text(text),
            Delta::ToolStarted(tool) => self.start_tool(tool),
            Delta::ToolFinished(tool) => self.finish_tool(tool),
            Delta::Completed => self.finish_response(),
            Delta::Cancelled => self.print_interrupted(),
            Delta::Failed(error) => self.print_error(error),
        }
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// This renderer outputs text directly to stdout with optional
/// ANSI escape codes for styling tool indicators and errors.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            line_start: true,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Prints a committed message, e.g. when replaying a conversation's history.
    pub fn print_message(&mut self, message: &Message) {
        let label = match message.role {
            MessageRole::User => "You",
            MessageRole::Assistant => "Agent",
        };
        if self.use_color {
            self.write(&format!("{ANSI_BOLD}{label}:{ANSI_RESET} "));
        } else {
            self.write(&format!("{label}: "));
        }
        self.write(&message.content);
        if let Some(tool_calls) = &message.tool_calls {
            for call in tool_calls {
                self.ensure_newline();
                let status = if call.is_resolved() { "done" } else { "pending" };
                self.write(&self.styled(ANSI_DIM, &format!("  [tool: {} ({status})]", call.name)));
            }
        }
        self.ensure_newline();
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{text}");
        self.line_start = text.ends_with('\n');
        self.flush();
    }

    fn ensure_newline(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        self.write(text);
    }

    fn start_tool(&mut self, tool: &ActiveTool) {
        self.ensure_newline();
        let mut line = self.styled(ANSI_CYAN, &format!("[running: {}]", tool.name));
        if !tool.args.is_empty() {
            let args = serde_json::Value::Object(tool.args.clone()).to_string();
            line.push(' ');
            line.push_str(&self.styled(ANSI_DIM, &args));
        }
        line.push('\n');
        self.write(&line);
    }

    fn finish_tool(&mut self, tool: &ActiveTool) {
        self.ensure_newline();
        let line = self.styled(ANSI_GREEN, &format!("[finished: {}]", tool.name));
        self.write(&format!("{line}\n"));
    }

    fn print_error(&mut self, error: &str) {
        self.ensure_newline();
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        eprintln!("{line}");
    }

    fn print_info(&mut self, info: &str) {
        self.ensure_newline();
        println!("{info}");
        self.line_start = true;
        self.flush();
    }

    fn finish_response(&mut self) {
        self.write("\n");
    }

    fn print_interrupted(&mut self) {
        self.ensure_newline();
        self.write("[interrupted]\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl Renderer for Recorder {
        fn print_text(&mut self, text: &str) {
            self.calls.push(format!("text:{text}"));
        }

        fn start_tool(&mut self, tool: &ActiveTool) {
            self.calls.push(format!("start:{}", tool.name));
        }

        fn finish_tool(&mut self, tool: &ActiveTool) {
            self.calls.push(format!("finish:{}", tool.name));
        }

        fn print_error(&mut self, error: &str) {
            self.calls.push(format!("error:{error}"));
        }

        fn print_info(&mut self, info: &str) {
            self.calls.push(format!("info:{info}"));
        }

        fn finish_response(&mut self) {
            self.calls.push("done".to_string());
        }
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
        assert!(!renderer.should_interrupt());
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
        assert_eq!(renderer.styled(ANSI_RED, "x"), "x");
    }

    #[test]
    fn interrupt_flag_is_observed() {
        let flag = Arc::new(AtomicBool::new(false));
        let renderer = PlainTextRenderer::with_color(false).with_interrupt(flag.clone());
        assert!(!renderer.should_interrupt());
        flag.store(true, Ordering::Relaxed);
        assert!(renderer.should_interrupt());
    }

    #[test]
    fn deltas_dispatch_in_order() {
        let mut recorder = Recorder::default();
        let tool = ActiveTool::new("grep", Default::default());
        for delta in [
            Delta::Text("a".to_string()),
            Delta::ToolStarted(tool.clone()),
            Delta::ToolFinished(tool),
            Delta::Failed("boom".to_string()),
            Delta::Cancelled,
            Delta::Completed,
        ] {
            recorder.render_delta(&delta);
        }
        assert_eq!(
            recorder.calls,
            vec!["text:a", "start:grep", "finish:grep", "error:boom", "done"]
        );
    }
}
