//! Saving and restoring the tag store.
//!
//! All runtime state lives in tags, so a snapshot of the store is enough to
//! carry latches, timers and counters across a restart.

use crate::error::{LadderError, Result};
use crate::tags::{TagStore, TagValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub tags: BTreeMap<String, TagValue>,
}

impl Snapshot {
    pub fn capture(store: &TagStore, program: Option<&str>) -> Self {
        Self {
            saved_at: Utc::now(),
            program: program.map(str::to_string),
            tags: store.snapshot(),
        }
    }

    /// Replace the contents of `store` with this snapshot.
    pub fn apply(&self, store: &TagStore) {
        store.restore(&self.tags);
    }
}

/// Atomically write `data` to `path` using a tempfile in the same directory,
/// so a crash mid-write never leaves a truncated state file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

pub fn save_snapshot(path: &Path, store: &TagStore, program: Option<&str>) -> Result<Snapshot> {
    let snapshot = Snapshot::capture(store, program);
    let data = serde_json::to_string_pretty(&snapshot)?;
    atomic_write(path, data.as_bytes())?;
    tracing::debug!(path = %path.display(), tags = snapshot.tags.len(), "snapshot saved");
    Ok(snapshot)
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let snapshot_err = |e: &dyn std::fmt::Display| {
        LadderError::Snapshot(format!("{}: {e}", path.display()))
    };
    let data = std::fs::read_to_string(path).map_err(|e| snapshot_err(&e))?;
    serde_json::from_str(&data).map_err(|e| snapshot_err(&e))
}
