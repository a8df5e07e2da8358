//! Activity log shown in the bottom panel.
//!
//! Keeps the last [`LOG_CAPACITY`] entries. Every entry is also written through
//! `tracing`, so the log file holds the full history.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local};
use tracing::{debug, error, info};

/// Entries kept in memory.
pub const LOG_CAPACITY: usize = 100;

/// Severity of an activity log entry. Ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Info,
    Debug,
}

impl LogLevel {
    /// Parse a config value; unknown values fall back to `Info`.
    pub fn from_config(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "debug" => Self::Debug,
            _ => Self::Info,
        }
    }

    /// Next display filter for the `v` key.
    pub fn cycle(self) -> Self {
        match self {
            Self::Error => Self::Info,
            Self::Info => Self::Debug,
            Self::Debug => Self::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub time: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// "[LEVEL] HH:MM:SS message"
    pub fn line(&self) -> String {
        format!(
            "[{}] {} {}",
            self.level,
            self.time.format("%H:%M:%S"),
            self.message
        )
    }
}

/// Bounded ring of log entries plus the current display filter.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    filter: LogLevel,
}

impl ActivityLog {
    pub fn new(filter: LogLevel) -> Self {
        Self {
            entries: VecDeque::with_capacity(LOG_CAPACITY),
            filter,
        }
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => error!("{}", message),
            LogLevel::Info => info!("{}", message),
            LogLevel::Debug => debug!("{}", message),
        }

        if self.entries.len() == LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            time: Local::now(),
            level,
            message,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Debug, message);
    }

    pub fn filter(&self) -> LogLevel {
        self.filter
    }

    pub fn cycle_filter(&mut self) -> LogLevel {
        self.filter = self.filter.cycle();
        self.filter
    }

    /// Entries at or below the display filter, oldest first.
    pub fn visible(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        let filter = self.filter;
        self.entries.iter().filter(move |e| e.level <= filter)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }
}
