//! Persistent watermark of the last processed bulletin.
//!
//! The checkpoint file is a small JSON document:
//!
//! ```json
//! { "lastId": 20250314001, "processedAt": "2025-03-14T10:12:00Z" }
//! ```
//!
//! Absence of the file means "process everything". Writes go to a temporary
//! file in the same directory which is then renamed over the target, so a
//! crash mid-write never leaves a truncated checkpoint behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::BulletinId;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("checkpoint is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub last_id: BulletinId,
    pub processed_at: DateTime<Utc>,
}

/// Storage for the run watermark.
///
/// Only the orchestrator touches the store during a run, so implementations
/// need no locking.
pub trait CheckpointStore: Send {
    /// Read the stored checkpoint. `Ok(None)` when no run has completed yet.
    fn read(&self) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Durably replace the stored checkpoint.
    fn save(&mut self, last_id: BulletinId, processed_at: DateTime<Utc>)
    -> Result<(), CheckpointError>;

    /// Last processed bulletin, or [`BulletinId::NONE`] when there is no
    /// usable checkpoint. Never fails.
    fn load(&self) -> BulletinId {
        match self.read() {
            Ok(Some(cp)) => cp.last_id,
            Ok(None) => BulletinId::NONE,
            Err(e) => {
                warn!(error = %e, "unreadable checkpoint, starting from scratch");
                BulletinId::NONE
            }
        }
    }
}

/// JSON-file checkpoint store.
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn read(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(
        &mut self,
        last_id: BulletinId,
        processed_at: DateTime<Utc>,
    ) -> Result<(), CheckpointError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let checkpoint = Checkpoint {
            last_id,
            processed_at,
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &checkpoint)?;
        tmp.as_file_mut().write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
