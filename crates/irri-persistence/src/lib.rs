//! ---
//! irri_section: "03-persistence-logging"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Persistence abstractions and storage bindings."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Durable archive contract for the coordination engine.
//!
//! The engine only ever appends records and asks for the most recent record
//! by `(kind, key)`. Archive failures are side-channel concerns: callers log
//! them and continue, they never block the in-memory or notification paths.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod jsonl;

pub use jsonl::{replay, JsonlArchive};

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Wrapper for IO errors while reading or writing archive files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when an archive file is missing its header line.
    #[error("archive header missing or corrupt")]
    CorruptHeader,
}

/// Entity families stored in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Latest-wins valve state snapshots.
    ValveState,
    /// Accepted weather readings.
    Weather,
    /// Irrigation audit events.
    IrrigationEvent,
}

impl RecordKind {
    /// Stable string form used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::ValveState => "valve_state",
            RecordKind::Weather => "weather",
            RecordKind::IrrigationEvent => "irrigation_event",
        }
    }
}

/// One archived record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// Sequential identifier assigned when appending.
    pub sequence: u64,
    /// Timestamp when the record was appended.
    pub timestamp: DateTime<Utc>,
    /// Entity family of the payload.
    pub kind: RecordKind,
    /// Lookup key within the family, e.g. a valve number or zone id.
    pub key: String,
    /// Serialized entity.
    pub payload: JsonValue,
}

/// Durable store collaborator: append-only with most-recent-by-key lookup.
pub trait Archive: Send + Sync {
    /// Append a record and return its assigned sequence number.
    fn append(&self, kind: RecordKind, key: &str, payload: JsonValue) -> Result<u64>;

    /// Return the most recently appended record for `(kind, key)`.
    fn latest(&self, kind: RecordKind, key: &str) -> Result<Option<ArchiveRecord>>;
}

/// Volatile archive for tests and single-process integration.
#[derive(Default)]
pub struct MemoryArchive {
    records: RwLock<Vec<ArchiveRecord>>,
    index: RwLock<HashMap<(RecordKind, String), ArchiveRecord>>,
}

impl MemoryArchive {
    /// Create an empty in-memory archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every appended record in order.
    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.read().clone()
    }

    /// Records of one family, in append order.
    pub fn records_of(&self, kind: RecordKind) -> Vec<ArchiveRecord> {
        self.records
            .read()
            .iter()
            .filter(|record| record.kind == kind)
            .cloned()
            .collect()
    }
}

impl Archive for MemoryArchive {
    fn append(&self, kind: RecordKind, key: &str, payload: JsonValue) -> Result<u64> {
        let mut records = self.records.write();
        let sequence = records.len() as u64 + 1;
        let record = ArchiveRecord {
            sequence,
            timestamp: Utc::now(),
            kind,
            key: key.to_owned(),
            payload,
        };
        self.index
            .write()
            .insert((kind, key.to_owned()), record.clone());
        records.push(record);
        Ok(sequence)
    }

    fn latest(&self, kind: RecordKind, key: &str) -> Result<Option<ArchiveRecord>> {
        Ok(self.index.read().get(&(kind, key.to_owned())).cloned())
    }
}
