//! Progress logs, printed to stdout and streamed to SSE clients.
//!
//! Validation, compilation and execution report progress through the
//! `log_*` helpers below. Every entry goes to stdout and to any subscriber
//! of [`LOG_BROADCASTER`] (the `/api/logs` endpoint).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Entries buffered per subscriber before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 100;

/// Log level for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting level (row-level detail under a pass summary)
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            indent: 0,
        }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    /// Console form of the entry.
    pub fn render(&self) -> String {
        format!(
            "{}{} {}",
            "   ".repeat(self.indent as usize),
            self.level.prefix(),
            self.message
        )
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Fans log entries out to every connected subscriber.
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Print the entry and send it to all subscribers.
    pub fn log(&self, entry: LogEntry) {
        println!("{}", entry.render());
        // no receivers is fine
        let _ = self.sender.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Info, msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Success, msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Warning, msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Error, msg));
}

pub fn log_warning_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::new(LogLevel::Warning, msg).with_indent(indent));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_indent_and_prefix() {
        let entry = LogEntry::new(LogLevel::Warning, "Row 4: key value is empty").with_indent(1);
        assert_eq!(entry.render(), "      ⚠️ Row 4: key value is empty");
    }

    #[test]
    fn test_entry_json_shape() {
        let json = serde_json::to_value(LogEntry::new(LogLevel::Success, "done")).unwrap();
        assert_eq!(json["level"], "success");
        assert_eq!(json["indent"], 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_entries() {
        let broadcaster = LogBroadcaster::with_capacity(4);
        let mut rx = broadcaster.subscribe();
        broadcaster.log(LogEntry::new(LogLevel::Info, "hello"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "hello");
    }
}
