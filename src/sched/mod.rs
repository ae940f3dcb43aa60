// src/sched/mod.rs

//! Pluggable batch-scheduler adapter abstraction.
//!
//! The engine talks to batch schedulers only through the
//! [`SchedulerAdapter`] capability: submit a command, poll a job id,
//! cancel a job id. Production adapters shell out to the site's batch
//! commands ([`command`]); tests swap in [`mock::MockScheduler`].
//!
//! Scheduler names are a closed, validated enum. An unknown name in the
//! source model fails at model-validation time, not at submit time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub mod command;
pub mod mock;

/// State of one scheduler job, as observed via polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    /// Created locally; submission has not succeeded yet.
    Pending,
    /// Accepted by the scheduler, waiting for resources.
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Result of polling one job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollStatus {
    pub state: JobState,
    pub exit_status: Option<i32>,
    /// Wall-clock runtime in seconds, reported once the job finished.
    pub execution_time: Option<f64>,
}

impl PollStatus {
    pub fn queued() -> Self {
        Self {
            state: JobState::Queued,
            exit_status: None,
            execution_time: None,
        }
    }

    pub fn running() -> Self {
        Self {
            state: JobState::Running,
            exit_status: None,
            execution_time: None,
        }
    }

    pub fn succeeded(execution_time: f64) -> Self {
        Self {
            state: JobState::Succeeded,
            exit_status: Some(0),
            execution_time: Some(execution_time),
        }
    }

    pub fn failed(exit_status: i32) -> Self {
        Self {
            state: JobState::Failed,
            exit_status: Some(exit_status),
            execution_time: None,
        }
    }
}

/// Capability exposed by every batch scheduler.
///
/// Calls are synchronous and blocking; the engine issues them one at a
/// time inside the locked critical section. The environment overlay is a
/// plain value handed to the adapter; adapters must never mutate the
/// process-wide environment.
pub trait SchedulerAdapter: fmt::Debug {
    /// Submit `command` with the resolved properties/environment and
    /// return the scheduler-assigned job id.
    fn submit(
        &self,
        command: &str,
        properties: &BTreeMap<String, String>,
        environment: &BTreeMap<String, String>,
    ) -> Result<String>;

    fn poll(&self, job_id: &str) -> Result<PollStatus>;

    fn cancel(&self, job_id: &str) -> Result<()>;
}

/// The closed set of known scheduler adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerKind {
    Sge,
    Lsf,
    LoadLeveler,
}

impl SchedulerKind {
    pub const ALL: [SchedulerKind; 3] =
        [SchedulerKind::Sge, SchedulerKind::Lsf, SchedulerKind::LoadLeveler];
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerKind::Sge => "sge",
            SchedulerKind::Lsf => "lsf",
            SchedulerKind::LoadLeveler => "loadleveler",
        };
        f.write_str(s)
    }
}

impl FromStr for SchedulerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sge" => Ok(SchedulerKind::Sge),
            "lsf" => Ok(SchedulerKind::Lsf),
            "ll" | "loadleveler" => Ok(SchedulerKind::LoadLeveler),
            other => Err(format!(
                "unrecognized scheduler '{other}' (expected sge, lsf or loadleveler)"
            )),
        }
    }
}

/// Explicit registry mapping validated scheduler names to adapter
/// instances. Adapter instances are runtime objects and are rebuilt on
/// every invocation; only the names travel through the persisted state.
#[derive(Debug, Default)]
pub struct SchedulerRegistry {
    adapters: HashMap<SchedulerKind, Box<dyn SchedulerAdapter>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the production command-line adapters for every
    /// known scheduler kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for kind in SchedulerKind::ALL {
            registry.register(kind, Box::new(command::CommandAdapter::for_kind(kind)));
        }
        registry
    }

    pub fn register(&mut self, kind: SchedulerKind, adapter: Box<dyn SchedulerAdapter>) {
        self.adapters.insert(kind, adapter);
    }

    pub fn get(&self, kind: SchedulerKind) -> Option<&dyn SchedulerAdapter> {
        self.adapters.get(&kind).map(|a| a.as_ref())
    }
}
