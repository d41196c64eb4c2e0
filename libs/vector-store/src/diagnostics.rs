use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiagnosticLevel {
    Warn,
    Error,
}

/// A retained diagnostic entry
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticEntry {
    pub level: DiagnosticLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Bounded in-memory log of store-layer incidents.
///
/// Infrastructure failures are downgraded to readiness booleans at the call
/// site; this buffer keeps the last ~200 of them inspectable without ever
/// growing unbounded. Oldest entries are evicted first.
#[derive(Debug)]
pub struct DiagnosticsLog {
    entries: Mutex<VecDeque<DiagnosticEntry>>,
    capacity: usize,
}

impl DiagnosticsLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(DiagnosticLevel::Warn, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(DiagnosticLevel::Error, message.into());
    }

    fn push(&self, level: DiagnosticLevel, message: String) {
        let mut entries = self.entries.lock().expect("diagnostics lock poisoned");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(DiagnosticEntry {
            level,
            message,
            at: Utc::now(),
        });
    }

    /// Copy of the retained entries, oldest first
    pub fn snapshot(&self) -> Vec<DiagnosticEntry> {
        self.entries
            .lock()
            .expect("diagnostics lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("diagnostics lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DiagnosticsLog {
    fn default() -> Self {
        Self::new()
    }
}
