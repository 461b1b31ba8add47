//! On-disk handoff files for the digest feature.
//!
//! - `SummaryStore`: append-only JSONL of summary records, drained by the
//!   digest job.
//! - `DigestStore`: the latest generated digest text, taken by its reader.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::feed::types::EntryId;

/// One summary-agent output, as persisted for the digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: EntryId,
    pub title: String,
    pub url: String,
    pub datetime: String,
    pub content: String,
}

/// Append-only record file shared by all pipeline workers.
pub struct SummaryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SummaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a JSON line.
    pub async fn append(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(entry_id = record.id, path = %self.path.display(), "Summary record appended");
        Ok(())
    }

    /// Read every record and truncate the file.
    ///
    /// Records are deduplicated by id: the last write wins, positioned where
    /// the id first appeared. Unparseable lines are skipped.
    pub async fn consume(&self) -> Result<Vec<SummaryRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        fs::write(&self.path, b"").await?;

        let mut records: Vec<SummaryRecord> = Vec::new();
        let mut index: HashMap<EntryId, usize> = HashMap::new();
        for (lineno, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: SummaryRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "Skipping malformed summary record");
                    continue;
                }
            };
            match index.get(&record.id) {
                Some(&i) => records[i] = record,
                None => {
                    index.insert(record.id, records.len());
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

/// Single-slot file holding the latest digest text.
pub struct DigestStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DigestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the stored digest.
    pub async fn write(&self, content: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        fs::write(&self.path, content.as_bytes()).await?;
        Ok(())
    }

    /// Return the stored digest and clear the file. Empty when nothing is stored.
    pub async fn take(&self) -> Result<String, StoreError> {
        let _guard = self.lock.lock().await;
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
            Err(e) => return Err(e.into()),
        };
        fs::write(&self.path, b"").await?;
        Ok(content)
    }
}
