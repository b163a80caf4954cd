use crate::error::{DroverError, Result};
use crate::io;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Notes longer than this are truncated before they hit the record file.
const MAX_NOTE_LEN: usize = 200;

// ---------------------------------------------------------------------------
// CompletedRecord
// ---------------------------------------------------------------------------

/// One completed work item, as appended by a worker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub account: String,
    pub item_id: String,
    /// Platform-side secondary identifier (UID) shown next to the item.
    pub secondary_id: String,
    /// The decision as stated by the decision source.
    pub decision_source: String,
    /// The status the platform recorded when the decision was applied.
    pub applied_status: String,
    #[serde(default)]
    pub notes: String,
    pub completed_at: DateTime<Utc>,
}

impl CompletedRecord {
    pub fn new(
        account: impl Into<String>,
        item_id: impl Into<String>,
        secondary_id: impl Into<String>,
        decision_source: impl Into<String>,
        applied_status: impl Into<String>,
        notes: &str,
    ) -> Self {
        Self {
            account: account.into(),
            item_id: item_id.into(),
            secondary_id: secondary_id.into(),
            decision_source: decision_source.into(),
            applied_status: applied_status.into(),
            notes: truncate(notes, MAX_NOTE_LEN),
            completed_at: Utc::now(),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    // Respect char boundaries when cutting.
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Where worker sessions append completed records.
pub trait RecordSink: Send + Sync {
    fn append(&self, record: &CompletedRecord) -> Result<()>;
}

/// Where the progress store reads back per-account completion counts.
pub trait RecordSource: Send + Sync {
    fn counts_by_account(&self) -> Result<HashMap<String, u32>>;
}

// ---------------------------------------------------------------------------
// JsonlRecordLog
// ---------------------------------------------------------------------------

/// JSON-Lines record log: one `CompletedRecord` per line, written through a
/// lock so concurrent sessions never interleave partial lines. The file is
/// the single source of truth for progress and is also read by external
/// tooling, so appends flush immediately.
pub struct JsonlRecordLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonlRecordLog {
    fn append(&self, record: &CompletedRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        io::append_line(&self.path, &line)
            .map_err(|e| DroverError::Persistence(format!("record append: {e}")))
    }
}

impl RecordSource for JsonlRecordLog {
    fn counts_by_account(&self) -> Result<HashMap<String, u32>> {
        let mut counts = HashMap::new();
        if !self.path.exists() {
            return Ok(counts);
        }
        let file = std::fs::File::open(&self.path)?;
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CompletedRecord>(&line) {
                Ok(record) => *counts.entry(record.account).or_insert(0) += 1,
                Err(e) => {
                    // A torn or foreign line must not invalidate the rest.
                    warn!(error = %e, "skipping unparseable record line");
                }
            }
        }
        Ok(counts)
    }
}
