// src/journal.rs

//! Append-only per-cycle workflow journal.
//!
//! When the workflow document sets a `log` target, lifecycle events are
//! appended as plain lines to the time-templated path, next to the
//! structured `tracing` output. The journal is an operator convenience:
//! write failures are logged and never abort orchestration.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

use crate::cycle::{format_cycle, TimeTemplate};

#[derive(Debug, Clone, Default)]
pub struct CycleJournal {
    target: Option<TimeTemplate>,
}

impl CycleJournal {
    pub fn new(target: Option<TimeTemplate>) -> Self {
        Self { target }
    }

    pub fn disabled() -> Self {
        Self { target: None }
    }

    /// Append one line for `cycle`. The target path is resolved against
    /// the cycle, so each cycle can land in its own file.
    pub fn record(&self, cycle: DateTime<Utc>, message: &str) {
        let Some(target) = &self.target else {
            return;
        };
        let path = target.resolve(cycle);
        let line = format!(
            "{} :: {} :: {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            format_cycle(cycle),
            message
        );
        if let Err(e) = append_line(Path::new(&path), &line) {
            warn!(path, error = %e, "failed to write workflow journal");
        }
    }
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}
