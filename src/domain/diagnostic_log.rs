//! Diagnostic Log
//!
//! Bounded, timestamped ring of user-visible log lines. Once the buffer is
//! full each new line evicts the oldest.

use chrono::{DateTime, Local, TimeZone};
use std::collections::VecDeque;
use std::fmt::Display;

/// Default number of retained lines
pub const DEFAULT_CAPACITY: usize = 100;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A zero capacity is raised to one so the latest line is always visible.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line stamped with the current local time
    pub fn append(&mut self, message: &str) -> Vec<String> {
        self.append_at(Local::now(), message)
    }

    /// Append a line stamped with `timestamp` and return the full buffer,
    /// oldest first.
    pub fn append_at<Tz>(&mut self, timestamp: DateTime<Tz>, message: &str) -> Vec<String>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let line = format!("{} {}", timestamp.format(TIMESTAMP_FORMAT), message);
        tracing::info!(target: "diagnostic", "{}", message);

        self.entries.push_back(line);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
