use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the owning registry was created.
    #[serde(rename = "time")]
    pub relative_time_ms: u64,
}

/// Append-only ring buffer; the oldest entry is evicted once `capacity` is reached.
pub struct EventLog {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    started: Instant,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            started: Instant::now(),
        }
    }

    pub fn append(&self, kind: LogKind, message: &str, details: Value) -> LogEntry {
        let entry = LogEntry {
            kind,
            message: message.to_string(),
            details,
            timestamp: Utc::now(),
            relative_time_ms: self.started.elapsed().as_millis() as u64,
        };
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_oldest_entries_are_evicted() {
        let log = EventLog::new(3);
        for i in 0..5 {
            log.append(LogKind::Info, &format!("entry {}", i), json!({}));
        }
        let messages: Vec<String> = log.entries().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[test]
    fn test_recent() {
        let log = EventLog::new(10);
        for i in 0..4 {
            log.append(LogKind::Success, &i.to_string(), json!(null));
        }
        let recent: Vec<String> = log.recent(2).into_iter().map(|e| e.message).collect();
        assert_eq!(recent, vec!["2", "3"]);
        assert_eq!(log.recent(10).len(), 4);
    }

    #[test]
    fn test_entry_serializes_with_wire_names() {
        let log = EventLog::new(1);
        let entry = log.append(LogKind::Warning, "careful", json!({"a": 1}));
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "warning");
        assert_eq!(value["message"], "careful");
        assert!(value.get("time").is_some());
    }
}
