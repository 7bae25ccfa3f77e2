//! Token audit trail.
//!
//! Records every token the tokenizer issues or redeems, so stored content
//! can be traced back to the key id and time it was protected. Records carry
//! the token (a store handle) and never any payload content.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A sink that receives audit records. Implement this to forward records
/// to a file, database, or log pipeline.
pub trait AuditSink: Send {
    /// Append a record. Called once per protected payload.
    fn append(&mut self, record: AuditRecord);
}

/// Which direction a token moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Content was stored and a fresh token encrypted.
    Tokenized,
    /// A token was decrypted and its content fetched.
    Redeemed,
}

/// A permanent record of one token event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub token: String,
    pub key_id: String,
    pub collection: String,
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
}

/// Fans each record out to every attached sink.
#[derive(Default)]
pub struct AuditTrail {
    sinks: Mutex<Vec<Box<dyn AuditSink>>>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("sinks", &self.sinks.lock().len())
            .finish()
    }
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach another sink.
    pub fn add_sink(&self, sink: Box<dyn AuditSink>) {
        self.sinks.lock().push(sink);
    }

    /// Builder-style variant of [`add_sink`](Self::add_sink).
    pub fn with_sink(self, sink: Box<dyn AuditSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Number of attached sinks.
    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forward `record` to every sink.
    pub fn append(&self, record: AuditRecord) {
        let mut sinks = self.sinks.lock();
        if let Some((last, rest)) = sinks.split_last_mut() {
            for sink in rest.iter_mut() {
                sink.append(record.clone());
            }
            last.append(record);
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in sink: file
// ---------------------------------------------------------------------------

/// Writes audit records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileAuditSink {
    file: std::fs::File,
}

impl FileAuditSink {
    /// Open or create a file for append-only audit logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl AuditSink for FileAuditSink {
    fn append(&mut self, record: AuditRecord) {
        let written = serde_json::to_string(&record)
            .map_err(std::io::Error::from)
            .and_then(|line| writeln!(self.file, "{line}"))
            .and_then(|()| self.file.flush());
        if let Err(err) = written {
            warn!(error = %err, "Audit record not written");
        }
    }
}
