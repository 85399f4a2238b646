//! Shared output layer for pretty/text/JSON parity across all commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. `output` in the user config file
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use clap::ValueEnum;
use promptlib_core::{ErrorCode, LibraryError};
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, visual framing).
    Pretty,
    /// Token-efficient plain text for agents and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" | "plain" => Some(Self::Text),
            "pretty" | "human" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    user_output: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    // Unknown values fall through to the next layer.
    if let Some(mode) = format_env.and_then(OutputMode::parse) {
        return mode;
    }
    if let Some(mode) = user_output.and_then(OutputMode::parse) {
        return mode;
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, user config and TTY defaults.
pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    user_output: Option<&str>,
) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(
        format_flag,
        json_flag,
        env_val.as_deref(),
        user_output,
        is_tty,
    )
}

/// Trait implemented by any CLI result type that can be rendered in all modes.
pub trait Renderable {
    /// Render for human consumption.
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()>;

    /// Render as one self-contained JSON object.
    fn render_json(&self, w: &mut dyn Write) -> io::Result<()>;

    /// Render as a single text row, columns in [`Renderable::table_headers`] order.
    fn render_table(&self, w: &mut dyn Write) -> io::Result<()>;

    fn table_headers() -> &'static [&'static str]
    where
        Self: Sized,
    {
        &[]
    }
}

/// Render a list of [`Renderable`] items into `out`.
///
/// JSON mode wraps items in an array; text mode prints a header row first.
pub fn write_list<R: Renderable>(out: &mut dyn Write, items: &[R], mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Pretty => {
            for item in items {
                item.render_human(out)?;
            }
        }
        OutputMode::Text => {
            let headers = if items.is_empty() {
                &[] as &[&str]
            } else {
                R::table_headers()
            };
            if !headers.is_empty() {
                writeln!(out, "{}", headers.join("  "))?;
            }
            for item in items {
                item.render_table(out)?;
            }
        }
        OutputMode::Json => {
            write!(out, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(out, ",")?;
                }
                writeln!(out)?;
                let mut buf = Vec::new();
                item.render_json(&mut buf)?;
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                out.write_all(&buf)?;
            }
            writeln!(out, "\n]")?;
        }
    }
    Ok(())
}

/// Render a list of [`Renderable`] items to stdout.
pub fn render_list<R: Renderable>(items: &[R], mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_list(&mut out, items, mode)
}

/// Render a serializable value with explicit pretty/text renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    /// An error carrying the code's hint as the suggestion.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

impl From<&LibraryError> for CliError {
    fn from(err: &LibraryError) -> Self {
        Self::from_code(err.code(), err.to_string())
    }
}

fn write_error(out: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({
                "error": error,
            });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(&mut out, mode, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptlib_core::PromptId;

    // ── resolve_output_mode_inner ───────────────────────────────────────────

    #[test]
    fn resolve_format_flag_wins_over_json_and_env() {
        let mode =
            resolve_output_mode_inner(Some(OutputMode::Text), true, Some("pretty"), None, true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_json_flag_wins_over_env() {
        let mode = resolve_output_mode_inner(None, true, Some("pretty"), None, true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_format_env_case_insensitive() {
        let mode = resolve_output_mode_inner(None, false, Some("TEXT"), None, true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_env_beats_user_config() {
        let mode = resolve_output_mode_inner(None, false, Some("json"), Some("pretty"), false);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_user_config_beats_tty_default() {
        let mode = resolve_output_mode_inner(None, false, None, Some("json"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_unknown_values_fall_through_to_tty() {
        let tty = resolve_output_mode_inner(None, false, Some("fancy"), Some("loud"), true);
        assert_eq!(tty, OutputMode::Pretty);
        let pipe = resolve_output_mode_inner(None, false, Some("fancy"), None, false);
        assert_eq!(pipe, OutputMode::Text);
    }

    // ── write_list ──────────────────────────────────────────────────────────

    struct Row {
        name: &'static str,
        count: u32,
    }

    impl Renderable for Row {
        fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
            writeln!(w, "{}: {}", self.name, self.count)
        }

        fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
            writeln!(w, "{{\"name\":\"{}\",\"count\":{}}}", self.name, self.count)
        }

        fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
            writeln!(w, "{}  {}", self.name, self.count)
        }

        fn table_headers() -> &'static [&'static str] {
            &["NAME", "COUNT"]
        }
    }

    fn rows() -> Vec<Row> {
        vec![Row { name: "a", count: 1 }, Row { name: "b", count: 2 }]
    }

    #[test]
    fn list_json_is_a_valid_array() {
        let mut buf = Vec::new();
        write_list(&mut buf, &rows(), OutputMode::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(2));
        assert_eq!(value[1]["name"], "b");
    }

    #[test]
    fn list_json_empty_is_empty_array() {
        let mut buf = Vec::new();
        write_list::<Row>(&mut buf, &[], OutputMode::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value, serde_json::json!([]));
    }

    #[test]
    fn list_text_prints_headers_once() {
        let mut buf = Vec::new();
        write_list(&mut buf, &rows(), OutputMode::Text).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "NAME  COUNT\na  1\nb  2\n");
    }

    #[test]
    fn list_text_empty_has_no_header() {
        let mut buf = Vec::new();
        write_list::<Row>(&mut buf, &[], OutputMode::Text).unwrap();
        assert!(buf.is_empty());
    }

    // ── errors ──────────────────────────────────────────────────────────────

    #[test]
    fn cli_error_from_library_error_carries_code_and_hint() {
        let err = LibraryError::NotFound(PromptId::new("ghost"));
        let cli_err = CliError::from(&err);
        assert!(cli_err.message.contains("ghost"));
        assert_eq!(cli_err.error_code.as_deref(), Some("E2001"));
        assert!(cli_err.suggestion.is_some());
    }

    #[test]
    fn error_json_is_wrapped() {
        let err = CliError::from_code(ErrorCode::TokenRequired, "writing requires an API token");
        let mut buf = Vec::new();
        write_error(&mut buf, OutputMode::Json, &err).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["error"]["error_code"], "E1003");
    }

    #[test]
    fn error_text_shows_code_and_suggestion() {
        let err = CliError::from_code(ErrorCode::ConfigMissing, "no store project id configured");
        let mut buf = Vec::new();
        write_error(&mut buf, OutputMode::Text, &err).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("error[E1001]: no store project id configured"));
        assert!(text.contains("suggestion: "));
    }
}
