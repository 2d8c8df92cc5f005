//! Audit trail for model calls.
//!
//! Each attempt of a logical call produces a `request` entry before the call is issued and a
//! `response` or `error` entry after it resolves. Entries share the call-id of the logical call.
//! Sinks must never fail the caller: errors are reported through `tracing` and dropped.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Which side of an attempt the entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEndpoint {
    Request,
    Response,
    Error,
}

impl AuditEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEndpoint::Request => "request",
            AuditEndpoint::Response => "response",
            AuditEndpoint::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub call_id: String,
    pub attempt: u32,
    pub endpoint: AuditEndpoint,
    pub model: String,
    pub provider: String,
    pub request: Value,
    pub response: Value,
    pub success: bool,
    pub error: Option<String>,
}

/// Destination for audit entries. Implementations swallow their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Keeps entries in memory, in arrival order.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

#[cfg(test)]
impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

#[cfg(test)]
impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) {
        self.entries.lock().push(entry.clone());
    }
}

const CSV_HEADER: [&str; 10] = [
    "timestamp",
    "call_id",
    "attempt",
    "endpoint",
    "model",
    "provider",
    "request",
    "raw_response",
    "success",
    "error",
];

/// Appends one CSV row per entry. The header is written when the file is first created.
pub struct CsvAuditSink {
    path: PathBuf,
    // Serializes appends from concurrent jobs sharing one sink.
    lock: Mutex<()>,
}

impl CsvAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let _guard = self.lock.lock();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(file);
        if is_new {
            writer.write_record(CSV_HEADER)?;
        }
        writer.write_record([
            entry.timestamp.to_rfc3339(),
            entry.call_id.clone(),
            entry.attempt.to_string(),
            entry.endpoint.as_str().to_string(),
            entry.model.clone(),
            entry.provider.clone(),
            entry.request.to_string(),
            entry.response.to_string(),
            entry.success.to_string(),
            entry.error.clone().unwrap_or_default(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

impl AuditSink for CsvAuditSink {
    fn record(&self, entry: &AuditEntry) {
        if let Err(e) = self.append(entry) {
            warn!(
                call_id = %entry.call_id,
                path = %self.path.display(),
                "Failed to write audit entry: {e}"
            );
        }
    }
}
