// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

pub mod mock;

/// Abstract view of the data-artifact filesystem.
///
/// Data dependencies only ever need two questions answered: does the
/// artifact exist, and when was it last modified. Production code uses
/// [`RealArtifactStore`]; tests use [`mock::MockArtifactStore`] to control
/// artifact presence and age without touching disk.
pub trait ArtifactStore: Debug {
    fn exists(&self, path: &Path) -> bool;

    /// Last modification time, or `None` if the artifact is missing or
    /// its metadata is unreadable.
    fn modified(&self, path: &Path) -> Option<DateTime<Utc>>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealArtifactStore;

impl ArtifactStore for RealArtifactStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn modified(&self, path: &Path) -> Option<DateTime<Utc>> {
        let mtime = fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::<Utc>::from(mtime))
    }
}
