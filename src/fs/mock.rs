// src/fs/mock.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::ArtifactStore;

/// In-memory artifact store for tests.
///
/// Artifacts are registered with an explicit modification time, so data
/// dependency ages can be tested against a fixed "now".
#[derive(Debug, Clone, Default)]
pub struct MockArtifactStore {
    entries: Arc<Mutex<HashMap<PathBuf, DateTime<Utc>>>>,
}

impl MockArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_artifact(&self, path: impl AsRef<Path>, modified: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(path.as_ref().to_path_buf(), modified);
    }

    pub fn remove_artifact(&self, path: impl AsRef<Path>) {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(path.as_ref());
    }
}

impl ArtifactStore for MockArtifactStore {
    fn exists(&self, path: &Path) -> bool {
        self.entries.lock().unwrap().contains_key(path)
    }

    fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.entries.lock().unwrap().get(path).copied()
    }
}
