//! Console bridge exposed to extensions.
//!
//! Every call is forwarded to `tracing` under the `archmage::console`
//! target with the extension id attached. Nothing is buffered.

use crate::command::Arg;
use crate::config::DEFAULT_CONSOLE_MAX_LEN;

/// Sanitize a console message from an extension.
///
/// Strips control characters (except newline/tab), truncates to `max_len`
/// characters.
fn sanitize_message(message: &str, max_len: usize) -> String {
    let cleaned: String = message
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(max_len)
        .collect();
    if message.chars().count() > max_len {
        format!("{cleaned}… (truncated)")
    } else {
        cleaned
    }
}

/// Console handle owned by one extension.
#[derive(Debug, Clone)]
pub struct Console {
    source: String,
    max_message_len: usize,
}

impl Console {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_max_message_len(source, DEFAULT_CONSOLE_MAX_LEN)
    }

    pub fn with_max_message_len(source: impl Into<String>, max_message_len: usize) -> Self {
        Self {
            source: source.into(),
            max_message_len,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Join `message` and `params` with spaces, then sanitize.
    pub fn format(&self, message: &str, params: &[Arg]) -> String {
        let mut line = message.to_string();
        for param in params {
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&param.to_string());
        }
        sanitize_message(&line, self.max_message_len)
    }

    pub fn log(&self, message: &str, params: &[Arg]) {
        let line = self.format(message, params);
        tracing::info!(target: "archmage::console", extension = %self.source, method = "log", "{line}");
    }

    pub fn info(&self, message: &str, params: &[Arg]) {
        let line = self.format(message, params);
        tracing::info!(target: "archmage::console", extension = %self.source, method = "info", "{line}");
    }

    pub fn warn(&self, message: &str, params: &[Arg]) {
        let line = self.format(message, params);
        tracing::warn!(target: "archmage::console", extension = %self.source, "{line}");
    }

    pub fn error(&self, message: &str, params: &[Arg]) {
        let line = self.format(message, params);
        tracing::error!(target: "archmage::console", extension = %self.source, "{line}");
    }

    /// Log an error when `value` is false. Returns `value`.
    pub fn assert(&self, value: bool, message: &str, params: &[Arg]) -> bool {
        if !value {
            let line = self.format(message, params);
            let line = if line.is_empty() {
                "Assertion failed".to_string()
            } else {
                format!("Assertion failed: {line}")
            };
            tracing::error!(target: "archmage::console", extension = %self.source, method = "assert", "{line}");
        }
        value
    }

    pub fn clear(&self) {
        tracing::debug!(target: "archmage::console", extension = %self.source, method = "clear", "console cleared");
    }
}
