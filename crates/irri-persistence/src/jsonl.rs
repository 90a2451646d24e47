//! ---
//! irri_section: "03-persistence-logging"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Persistence abstractions and storage bindings."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::Digest;
use tracing::debug;

use crate::{Archive, ArchiveError, ArchiveRecord, RecordKind, Result};

/// On-disk format version written into the header line.
pub const ARCHIVE_VERSION: u16 = 1;

/// Header stored as the first line of every archive file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveHeader {
    version: u16,
    created_at: DateTime<Utc>,
    hash: String,
}

impl ArchiveHeader {
    fn new() -> Self {
        let created_at = Utc::now();
        let hash = format!(
            "{:x}",
            sha2::Sha256::digest(created_at.to_rfc3339().as_bytes())
        );
        Self {
            version: ARCHIVE_VERSION,
            created_at,
            hash,
        }
    }
}

struct Writer {
    out: BufWriter<File>,
    next_sequence: u64,
}

/// Append-only JSONL archive with an in-memory most-recent-by-key index.
///
/// One file holds every record family; the index is rebuilt by replaying the
/// file on open, so the cold-start `latest` path never scans the log.
pub struct JsonlArchive {
    path: PathBuf,
    writer: Mutex<Writer>,
    index: RwLock<HashMap<(RecordKind, String), ArchiveRecord>>,
}

impl JsonlArchive {
    /// Open (or create) an archive at `path`, writing a header when new and
    /// rebuilding the latest-by-key index from existing records.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let exists = path.exists() && fs::metadata(path)?.len() > 0;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut out = BufWriter::new(file);

        let mut index = HashMap::new();
        let next_sequence = if exists {
            let mut last = 0u64;
            replay(path, |record| {
                last = record.sequence;
                index.insert((record.kind, record.key.clone()), record);
                Ok(())
            })?;
            last
        } else {
            let header = serde_json::to_string(&ArchiveHeader::new())?;
            out.write_all(header.as_bytes())?;
            out.write_all(b"\n")?;
            out.flush()?;
            0
        };

        debug!(path = %path.display(), next_sequence, indexed = index.len(), "archive opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(Writer { out, next_sequence }),
            index: RwLock::new(index),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Archive for JsonlArchive {
    fn append(&self, kind: RecordKind, key: &str, payload: JsonValue) -> Result<u64> {
        let record = {
            let mut writer = self.writer.lock();
            writer.next_sequence += 1;
            let record = ArchiveRecord {
                sequence: writer.next_sequence,
                timestamp: Utc::now(),
                kind,
                key: key.to_owned(),
                payload,
            };
            let line = serde_json::to_string(&record)?;
            writer.out.write_all(line.as_bytes())?;
            writer.out.write_all(b"\n")?;
            writer.out.flush()?;
            record
        };
        let sequence = record.sequence;
        self.index
            .write()
            .insert((kind, key.to_owned()), record);
        Ok(sequence)
    }

    fn latest(&self, kind: RecordKind, key: &str) -> Result<Option<ArchiveRecord>> {
        Ok(self.index.read().get(&(kind, key.to_owned())).cloned())
    }
}

/// Replay an archive file in order, invoking the handler for each record.
pub fn replay<F>(path: &Path, mut handler: F) -> Result<usize>
where
    F: FnMut(ArchiveRecord) -> Result<()>,
{
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut header_line = String::new();
    reader.read_line(&mut header_line)?;
    if serde_json::from_str::<ArchiveHeader>(header_line.trim()).is_err() {
        return Err(ArchiveError::CorruptHeader);
    }

    let mut count = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ArchiveRecord = serde_json::from_str(&line)?;
        handler(record)?;
        count += 1;
    }
    Ok(count)
}
