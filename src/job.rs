// src/job.rs

//! One submission attempt of one task for one cycle.
//!
//! A `Job` binds a resolved command, properties and environment to a
//! scheduler job id. Jobs are created on submit and mutated only by
//! polling; a retry creates a brand-new `Job` record for the same
//! (task, cycle) key rather than resurrecting the old one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::sched::{JobState, SchedulerAdapter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Scheduler-assigned id; `None` until submission succeeds.
    pub scheduler_id: Option<String>,
    pub state: JobState,
    pub exit_status: Option<i32>,
    /// Wall-clock runtime in seconds, known once the job finished.
    pub execution_time: Option<f64>,
    pub command: String,
    pub properties: BTreeMap<String, String>,
    pub environment: BTreeMap<String, String>,
}

impl Job {
    pub fn new(
        command: String,
        properties: BTreeMap<String, String>,
        environment: BTreeMap<String, String>,
    ) -> Self {
        Self {
            scheduler_id: None,
            state: JobState::Pending,
            exit_status: None,
            execution_time: None,
            command,
            properties,
            environment,
        }
    }

    /// Submit via the adapter. On success the scheduler id is recorded
    /// and the job moves to `QUEUED`; on failure the id stays unset so a
    /// later pass can retry the submission.
    pub fn submit(&mut self, adapter: &dyn SchedulerAdapter) -> Result<()> {
        let id = adapter.submit(&self.command, &self.properties, &self.environment)?;
        self.scheduler_id = Some(id);
        self.state = JobState::Queued;
        Ok(())
    }

    /// Poll the scheduler and fold the result into this record.
    ///
    /// A terminal job is never polled again by the task state machine,
    /// so each terminal transition is observed exactly once.
    pub fn poll(&mut self, adapter: &dyn SchedulerAdapter) -> Result<()> {
        let Some(id) = self.scheduler_id.as_deref() else {
            return Ok(());
        };
        let status = adapter.poll(id)?;
        self.state = status.state;
        if status.exit_status.is_some() {
            self.exit_status = status.exit_status;
        }
        if status.execution_time.is_some() {
            self.execution_time = status.execution_time;
        }
        Ok(())
    }

    pub fn cancel(&self, adapter: &dyn SchedulerAdapter) -> Result<()> {
        match self.scheduler_id.as_deref() {
            Some(id) => adapter.cancel(id),
            None => Ok(()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn done_okay(&self) -> bool {
        self.state == JobState::Succeeded
    }

    pub fn crashed(&self) -> bool {
        self.state == JobState::Failed
    }

    /// Whether this job counts against its task's throttle: accepted by
    /// the scheduler and not yet terminal.
    pub fn is_active(&self) -> bool {
        self.scheduler_id.is_some() && !self.is_terminal()
    }
}
