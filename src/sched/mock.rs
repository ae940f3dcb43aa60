// src/sched/mock.rs

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::{PollStatus, SchedulerAdapter};
use crate::errors::{CycleflowError, Result};

/// One recorded submission.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job_id: String,
    pub command: String,
    pub properties: BTreeMap<String, String>,
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    submitted: Vec<SubmittedJob>,
    cancelled: Vec<String>,
    /// Scripted poll results per job id, consumed front to back. Once a
    /// script is exhausted its last result keeps repeating.
    scripts: HashMap<String, VecDeque<PollStatus>>,
    last_result: HashMap<String, PollStatus>,
    /// Default script applied to every newly submitted job.
    default_script: Vec<PollStatus>,
    fail_submit: bool,
    fail_poll: bool,
}

/// Scripted in-memory scheduler for tests.
///
/// Poll behaviour is driven by per-job scripts: each call to `poll`
/// consumes the next scripted status. With no script, jobs report
/// `QUEUED` forever. Cloning yields a handle onto the same recorded
/// state, so a test can keep a handle while the registry owns another.
#[derive(Debug, Clone, Default)]
pub struct MockScheduler {
    inner: Arc<Mutex<Inner>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the given poll script to every job submitted from now on.
    pub fn script_all(&self, script: Vec<PollStatus>) {
        self.inner.lock().unwrap().default_script = script;
    }

    /// Override the poll script for one job id.
    pub fn script_job(&self, job_id: &str, script: Vec<PollStatus>) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripts.insert(job_id.to_string(), script.into());
        inner.last_result.remove(job_id);
    }

    pub fn set_fail_submit(&self, fail: bool) {
        self.inner.lock().unwrap().fail_submit = fail;
    }

    pub fn set_fail_poll(&self, fail: bool) {
        self.inner.lock().unwrap().fail_poll = fail;
    }

    pub fn submitted(&self) -> Vec<SubmittedJob> {
        self.inner.lock().unwrap().submitted.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.inner.lock().unwrap().submitted.len()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.inner.lock().unwrap().cancelled.clone()
    }
}

impl SchedulerAdapter for MockScheduler {
    fn submit(
        &self,
        command: &str,
        properties: &BTreeMap<String, String>,
        environment: &BTreeMap<String, String>,
    ) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_submit {
            return Err(CycleflowError::Scheduler(
                "mock scheduler rejected submission".to_string(),
            ));
        }

        inner.next_id += 1;
        let job_id = format!("job-{}", inner.next_id);
        inner.submitted.push(SubmittedJob {
            job_id: job_id.clone(),
            command: command.to_string(),
            properties: properties.clone(),
            environment: environment.clone(),
        });

        let script = inner.default_script.clone();
        if !script.is_empty() {
            inner.scripts.insert(job_id.clone(), script.into());
        }

        Ok(job_id)
    }

    fn poll(&self, job_id: &str) -> Result<PollStatus> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_poll {
            return Err(CycleflowError::Scheduler(
                "mock scheduler poll failed".to_string(),
            ));
        }

        if let Some(script) = inner.scripts.get_mut(job_id) {
            if let Some(status) = script.pop_front() {
                inner.last_result.insert(job_id.to_string(), status);
                return Ok(status);
            }
        }

        if let Some(status) = inner.last_result.get(job_id) {
            return Ok(*status);
        }

        Ok(PollStatus::queued())
    }

    fn cancel(&self, job_id: &str) -> Result<()> {
        self.inner.lock().unwrap().cancelled.push(job_id.to_string());
        Ok(())
    }
}
