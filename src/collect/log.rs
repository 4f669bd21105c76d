//! Execution log entries.

use crate::core::GroupKey;
use crate::error::ForecastError;
use serde::Serialize;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Note,
    Warning,
    Error,
}

/// A message raised by one of the stages before it is tied to a group.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub severity: Severity,
    pub code: i32,
    pub message: String,
}

impl Note {
    pub fn note(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            code: 0,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: 0,
            message: message.into(),
        }
    }

    pub fn error(err: &ForecastError) -> Self {
        Self {
            severity: Severity::Error,
            code: err.code(),
            message: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// One row of the execution log table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Absent for run-level entries.
    #[serde(flatten)]
    pub key: Option<GroupKey>,
    #[serde(rename = "_ERRORNO_")]
    pub code: i32,
    #[serde(rename = "_SEVERITY_")]
    pub severity: Severity,
    #[serde(rename = "_MSGLEN_")]
    pub length: usize,
    #[serde(rename = "_MSG_")]
    pub message: String,
}

impl LogEntry {
    pub fn new(key: Option<GroupKey>, note: Note) -> Self {
        Self {
            key,
            code: note.code,
            severity: note.severity,
            length: note.message.len(),
            message: note.message,
        }
    }

    pub fn run(note: Note) -> Self {
        Self::new(None, note)
    }

    pub fn group(key: &GroupKey, note: Note) -> Self {
        Self::new(Some(key.clone()), note)
    }
}
