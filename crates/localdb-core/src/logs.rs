use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::{error, info, warn};

const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

/// Per-resource log buffers. Lines are also emitted through `tracing`.
pub struct ResourceLoggerService {
    buffers: Mutex<HashMap<String, VecDeque<LogLine>>>,
    capacity: usize,
}

impl Default for ResourceLoggerService {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ResourceLoggerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` lines per resource, dropping the oldest.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn logger(&self, resource: &str) -> ResourceLogger<'_> {
        ResourceLogger {
            service: self,
            resource: resource.to_owned(),
        }
    }

    pub fn lines(&self, resource: &str) -> Vec<LogLine> {
        self.buffers
            .lock()
            .ok()
            .and_then(|map| map.get(resource).map(|b| b.iter().cloned().collect()))
            .unwrap_or_default()
    }

    fn push(&self, resource: &str, level: LogLevel, message: &str) {
        let Ok(mut map) = self.buffers.lock() else {
            return;
        };
        let buffer = map.entry(resource.to_owned()).or_default();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(LogLine {
            at: Local::now(),
            level,
            message: message.to_owned(),
        });
    }
}

/// Logger bound to one resource.
pub struct ResourceLogger<'a> {
    service: &'a ResourceLoggerService,
    resource: String,
}

impl ResourceLogger<'_> {
    pub fn info(&self, message: &str) {
        info!(resource = %self.resource, "{message}");
        self.service.push(&self.resource, LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        warn!(resource = %self.resource, "{message}");
        self.service.push(&self.resource, LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        error!(resource = %self.resource, "{message}");
        self.service.push(&self.resource, LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_kept_per_resource() {
        let logs = ResourceLoggerService::new();
        logs.logger("TestDb").info("Creating LocalDb instance TestDb");
        logs.logger("Database").error("Failed to deploy dacpac.");

        let instance = logs.lines("TestDb");
        assert_eq!(instance.len(), 1);
        assert_eq!(instance[0].level, LogLevel::Info);

        let db = logs.lines("Database");
        assert_eq!(db[0].level, LogLevel::Error);
        assert!(logs.lines("Other").is_empty());
    }

    #[test]
    fn buffer_drops_oldest_lines() {
        let logs = ResourceLoggerService::with_capacity(2);
        let logger = logs.logger("TestDb");
        logger.info("one");
        logger.warn("two");
        logger.info("three");

        let lines: Vec<_> = logs
            .lines("TestDb")
            .into_iter()
            .map(|l| l.message)
            .collect();
        assert_eq!(lines, vec!["two", "three"]);
    }
}
