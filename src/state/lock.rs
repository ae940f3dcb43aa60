// src/state/lock.rs

//! Advisory exclusive lock serializing access to the persisted state.
//!
//! The lock is a file created with `O_EXCL`; whoever creates it owns the
//! critical section and removes it on drop. Acquisition retries with a
//! linearly increasing sleep up to a cap. A lock file older than
//! `max_age` is presumed to belong to a crashed invocation and is broken.
//!
//! Run operations use a bounded retry budget and surface
//! [`CycleflowError::WorkflowLocked`] when it is exhausted; control
//! operations retry without bound, trading availability for correctness
//! of administrative commands.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::{CycleflowError, Result};

#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Retries after the first attempt; `None` = retry without bound.
    pub retries: Option<u32>,
    /// Sleep grows by this much per attempt.
    pub sleep_inc: Duration,
    pub min_sleep: Duration,
    pub max_sleep: Duration,
    /// A lock file older than this is considered stale and broken.
    pub max_age: Duration,
}

impl LockOptions {
    /// Bounded budget for `run`.
    pub fn for_run() -> Self {
        Self {
            retries: Some(1),
            sleep_inc: Duration::from_secs(2),
            min_sleep: Duration::from_secs(2),
            max_sleep: Duration::from_secs(10),
            max_age: Duration::from_secs(900),
        }
    }

    /// Unbounded retries for halt/pause/resume.
    pub fn for_control() -> Self {
        Self {
            retries: None,
            ..Self::for_run()
        }
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::for_run()
    }
}

/// Guard for the exclusive state lock; released on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock at `path`, retrying per `opts`.
    pub fn acquire(path: &Path, opts: &LockOptions) -> Result<LockFile> {
        let mut attempt: u32 = 0;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    // Contents are informational only; ownership is the
                    // file's existence.
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!(path = %path.display(), "acquired state lock");
                    return Ok(LockFile {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::break_if_stale(path, opts.max_age) {
                        continue;
                    }
                    if let Some(budget) = opts.retries {
                        if attempt >= budget {
                            return Err(CycleflowError::WorkflowLocked);
                        }
                    }
                    let sleep = (opts.min_sleep + opts.sleep_inc * attempt)
                        .min(opts.max_sleep);
                    debug!(
                        path = %path.display(),
                        attempt,
                        sleep_ms = sleep.as_millis() as u64,
                        "state lock busy, retrying"
                    );
                    std::thread::sleep(sleep);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove a lock file whose age exceeds `max_age`. Returns whether
    /// the lock was broken.
    fn break_if_stale(path: &Path, max_age: Duration) -> bool {
        let age = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|mtime| mtime.elapsed().ok());

        match age {
            Some(age) if age > max_age => {
                warn!(
                    path = %path.display(),
                    age_secs = age.as_secs(),
                    "breaking stale state lock"
                );
                fs::remove_file(path).is_ok()
            }
            _ => false,
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }
    }
}
