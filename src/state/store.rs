// src/state/store.rs

//! Versioned, transactional state storage.
//!
//! The aggregate is written as a single JSON snapshot with an explicit
//! schema version. Writes go to a temporary file in the same directory
//! followed by an atomic rename, so a crash mid-write leaves the
//! previous snapshot intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::errors::{CycleflowError, Result};
use crate::state::WorkflowState;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Snapshot {
    schema_version: u32,
    state: WorkflowState,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the advisory lock guarding this store.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Read the last snapshot, or `None` if the store does not exist
    /// yet (first invocation).
    pub fn load(&self) -> Result<Option<WorkflowState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;

        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(CycleflowError::State(format!(
                "unsupported state schema version {} (expected {})",
                snapshot.schema_version, SCHEMA_VERSION
            )));
        }

        debug!(path = %self.path.display(), "loaded state snapshot");
        Ok(Some(snapshot.state))
    }

    /// Write the aggregate as one unit.
    pub fn save(&self, state: &WorkflowState) -> Result<()> {
        let snapshot = Snapshot {
            schema_version: SCHEMA_VERSION,
            state: state.clone(),
        };
        let encoded = serde_json::to_string_pretty(&snapshot)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(encoded.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(path = %self.path.display(), "persisted state snapshot");
        Ok(())
    }
}
