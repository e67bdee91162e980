//! Log event classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to a server output line. First matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Info,
    Warning,
    Error,
    Metric,
}

impl LogCategory {
    /// Classify a raw output line, case-insensitively.
    pub fn classify(line: &str) -> Self {
        let lower = line.to_lowercase();
        if lower.contains("error") || lower.contains("failed") {
            Self::Error
        } else if lower.contains("warning") || lower.contains("warn") {
            Self::Warning
        } else if lower.contains("token")
            || lower.contains("eval time")
            || lower.contains("prompt eval")
        {
            Self::Metric
        } else {
            Self::Info
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Metric => "metric",
        };
        write!(f, "{s}")
    }
}

/// A classified line of server output.
///
/// Sequence numbers follow the order the reader observed lines, which is
/// not necessarily the interleaving order of the process's original
/// stdout/stderr writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub category: LogCategory,
    pub text: String,
    pub seq: u64,
}

impl LogEvent {
    /// Build an event from a raw line, classifying it on the way.
    pub fn new(seq: u64, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            category: LogCategory::classify(&text),
            text,
            seq,
        }
    }
}

/// Wire form consumed by the control surface: `category|text`.
impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.category, self.text)
    }
}
