//! Per-run log document.
//!
//! [`RunLog`] is an explicit collector passed through a harvest run. Every
//! entry is mirrored to `tracing` as it is recorded, and the whole document is
//! written once, as a JSON array, when the run ends. If the collector is
//! dropped without an explicit [`flush`](RunLog::flush) (fatal error, early
//! return, unwinding) the `Drop` impl writes it instead, so every exit path
//! leaves a log behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Structured context such as `boletim_id` / `bidding_id`.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

pub struct RunLog {
    entries: Vec<LogEntry>,
    destination: Option<PathBuf>,
    flushed: bool,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl RunLog {
    /// Collector that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            destination: None,
            flushed: false,
        }
    }

    /// Collector that writes its document to `path` on flush.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            destination: Some(path.into()),
            flushed: false,
        }
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Info, message, no_fields());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Warning, message, no_fields());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Error, message, no_fields());
    }

    pub fn critical(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Critical, message, no_fields());
    }

    /// Append an entry with structured context fields.
    pub fn record<I, K>(&mut self, level: LogLevel, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        };
        mirror(&entry);
        self.entries.push(entry);
    }

    /// Write the document to its destination. Only the first call writes;
    /// returns the path written, if any.
    pub fn flush(&mut self) -> std::io::Result<Option<PathBuf>> {
        if self.flushed {
            return Ok(None);
        }
        self.flushed = true;
        let Some(path) = self.destination.clone() else {
            return Ok(None);
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&path, json)?;
        info!(path = %path.display(), entries = self.entries.len(), "run log written");
        Ok(Some(path))
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!(error = %e, "failed to write run log");
        }
    }
}

fn no_fields() -> std::iter::Empty<(String, Value)> {
    std::iter::empty()
}

fn mirror(entry: &LogEntry) {
    let context = if entry.fields.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&entry.fields).unwrap_or_default()
    };
    match entry.level {
        LogLevel::Info => info!(context = %context, "{}", entry.message),
        LogLevel::Warning => warn!(context = %context, "{}", entry.message),
        LogLevel::Error | LogLevel::Critical => {
            error!(level = ?entry.level, context = %context, "{}", entry.message)
        }
    }
}
