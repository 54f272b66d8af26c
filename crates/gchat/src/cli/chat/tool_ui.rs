//! Translates tool events into terminal output.

use std::io::Write;

use crossterm::style::{
    self,
    Color,
};
use crossterm::{
    execute,
    queue,
};
use serde_json::Value;

use crate::cli::chat::parser::ToolEventHooks;
use crate::util::spinner::SpinnerSlot;

/// Longest parameter or result summary printed, in chars.
const MAX_SUMMARY_CHARS: usize = 200;

/// Prints a line per tool call and result. Stops the spinner first since the hooks own the
/// terminal while they run.
#[derive(Debug)]
pub struct TerminalToolUi<W> {
    output: W,
    spinner: SpinnerSlot,
}

impl<W: Write + Send> TerminalToolUi<W> {
    pub fn new(output: W, spinner: SpinnerSlot) -> Self {
        Self { output, spinner }
    }
}

impl<W: Write + Send> ToolEventHooks for TerminalToolUi<W> {
    fn before_tool_call(&mut self, name: &str, params: &Value) -> eyre::Result<()> {
        self.spinner.stop(&mut self.output)?;
        queue!(
            self.output,
            style::SetForegroundColor(Color::Magenta),
            style::Print("● Using tool: "),
            style::SetForegroundColor(Color::Reset),
            style::SetAttribute(style::Attribute::Bold),
            style::Print(name),
            style::SetAttribute(style::Attribute::Reset),
            style::Print("\n"),
        )?;
        if let Some(params) = summarize(params) {
            queue!(
                self.output,
                style::SetForegroundColor(Color::DarkGrey),
                style::Print(format!("  {params}\n")),
                style::ResetColor,
            )?;
        }
        self.output.flush()?;
        Ok(())
    }

    fn after_tool_result(&mut self, name: &str, result: &Value) -> eyre::Result<()> {
        self.spinner.stop(&mut self.output)?;
        let (color, mark) = match result.get("error") {
            Some(_) => (Color::Red, "✗"),
            None => (Color::Green, "✓"),
        };
        execute!(
            self.output,
            style::SetForegroundColor(color),
            style::Print(format!("  {mark} {name}")),
            style::SetForegroundColor(Color::DarkGrey),
            style::Print(summarize(result).map(|s| format!(": {s}")).unwrap_or_default()),
            style::ResetColor,
            style::Print("\n\n"),
        )?;
        Ok(())
    }
}

/// A one-line rendering of a JSON value, truncated. `None` for empty values.
fn summarize(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::Object(map) if map.is_empty() => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match text.char_indices().nth(MAX_SUMMARY_CHARS) {
        Some((index, _)) => Some(format!("{}...", &text[..index])),
        None => Some(text),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&json!(null)), None);
        assert_eq!(summarize(&json!({})), None);
        assert_eq!(summarize(&json!("two\n  lines")).as_deref(), Some("two lines"));
        assert_eq!(summarize(&json!({"q": 1})).as_deref(), Some(r#"{"q":1}"#));

        let long = "x".repeat(MAX_SUMMARY_CHARS + 10);
        let summary = summarize(&json!(long)).unwrap();
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), MAX_SUMMARY_CHARS + 3);
    }

    #[test]
    fn test_tool_lines() {
        let mut ui = TerminalToolUi::new(Vec::new(), SpinnerSlot::default());
        ui.before_tool_call("code_execution", &json!({"language": "PYTHON", "code": "print(1)"}))
            .unwrap();
        ui.after_tool_result("code_execution", &json!({"outcome": "OUTCOME_OK", "output": "1\n"}))
            .unwrap();
        ui.after_tool_result("lookup", &json!({"error": "server exited"})).unwrap();

        let out = String::from_utf8(ui.output).unwrap();
        assert!(out.contains("● Using tool: "));
        assert!(out.contains("code_execution"));
        assert!(out.contains(r#"print(1)"#));
        assert!(out.contains("✓ code_execution"));
        assert!(out.contains("✗ lookup"));
        assert!(out.contains("server exited"));
    }
}
