//! Append-only operation log at `<root>/cache.log`

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Severity written in front of each journal line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalLevel {
    /// Routine outcome, including cache misses
    Info,
    /// Recoverable anomaly
    Warn,
    /// Failed operation
    Error,
}

impl fmt::Display for JournalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// Human-readable, timestamped log shared with external tooling
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    /// Journal writing to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the log file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. Failures are reported through tracing and otherwise ignored.
    pub fn append(&self, level: JournalLevel, message: impl fmt::Display) {
        let line = format!(
            "[{}] [{level}] {message}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), "Failed to append to cache log: {e}");
        }
    }

    /// Append an `INFO` line
    pub fn info(&self, message: impl fmt::Display) {
        self.append(JournalLevel::Info, message);
    }

    /// Append a `WARN` line
    pub fn warn(&self, message: impl fmt::Display) {
        self.append(JournalLevel::Warn, message);
    }

    /// Append an `ERROR` line
    pub fn error(&self, message: impl fmt::Display) {
        self.append(JournalLevel::Error, message);
    }
}
