// src/sched/command.rs

//! Command-line glue adapters for real batch schedulers.
//!
//! The orchestration core only depends on the submit/poll/cancel
//! capability; the specific invocation syntax of each scheduler lives
//! here and stays deliberately thin. Each adapter wraps the site's
//! native commands:
//!
//! | kind        | submit     | poll   | cancel     |
//! |-------------|------------|--------|------------|
//! | sge         | `qsub`     | `qstat`| `qdel`     |
//! | lsf         | `bsub`     | `bjobs`| `bkill`    |
//! | loadleveler | `llsubmit` | `llq`  | `llcancel` |
//!
//! Submission passes resolved task properties as `NAME=VALUE` arguments
//! after the action command and the environment overlay via
//! `Command::envs` on the child only; the orchestrator's own process
//! environment is never touched.

use std::collections::BTreeMap;
use std::process::Command;

use tracing::debug;

use super::{JobState, PollStatus, SchedulerAdapter, SchedulerKind};
use crate::errors::{CycleflowError, Result};

#[derive(Debug, Clone)]
pub struct CommandAdapter {
    kind: SchedulerKind,
    submit_cmd: &'static str,
    poll_cmd: &'static str,
    cancel_cmd: &'static str,
}

impl CommandAdapter {
    pub fn for_kind(kind: SchedulerKind) -> Self {
        let (submit_cmd, poll_cmd, cancel_cmd) = match kind {
            SchedulerKind::Sge => ("qsub", "qstat", "qdel"),
            SchedulerKind::Lsf => ("bsub", "bjobs", "bkill"),
            SchedulerKind::LoadLeveler => ("llsubmit", "llq", "llcancel"),
        };
        Self {
            kind,
            submit_cmd,
            poll_cmd,
            cancel_cmd,
        }
    }

    fn run(&self, program: &str, args: &[&str], env: Option<&BTreeMap<String, String>>) -> Result<String> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(env) = env {
            cmd.envs(env);
        }

        let output = cmd.output().map_err(|e| {
            CycleflowError::Scheduler(format!("failed to invoke {program}: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CycleflowError::Scheduler(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Pull the first token that looks like a job id out of submit
    /// output. All three schedulers print the new id as the first
    /// numeric token ("Your job 12345 ...", "Job <12345> is submitted",
    /// "llsubmit: The job \"host.12345\" ...").
    fn extract_job_id(stdout: &str) -> Option<String> {
        stdout
            .split(|c: char| !c.is_ascii_digit())
            .find(|tok| !tok.is_empty())
            .map(|tok| tok.to_string())
    }

    /// Map a poll output line to a job state.
    ///
    /// An empty poll output means the scheduler no longer knows the job;
    /// the accounting fallback below decides success/failure.
    fn parse_state(&self, stdout: &str) -> Option<JobState> {
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty() && !l.starts_with("job-ID") && !l.starts_with('-'))?;

        let token = match self.kind {
            // qstat/llq state column letters.
            SchedulerKind::Sge | SchedulerKind::LoadLeveler => {
                line.split_whitespace().nth(4).unwrap_or("")
            }
            // bjobs STAT column.
            SchedulerKind::Lsf => line.split_whitespace().nth(2).unwrap_or(""),
        };

        match token {
            "r" | "R" | "RUN" | "ST" => Some(JobState::Running),
            "qw" | "I" | "PEND" | "PSUSP" | "hqw" => Some(JobState::Queued),
            "DONE" | "C" => Some(JobState::Succeeded),
            "EXIT" | "Eqw" | "NR" | "RM" => Some(JobState::Failed),
            _ => Some(JobState::Queued),
        }
    }
}

impl SchedulerAdapter for CommandAdapter {
    fn submit(
        &self,
        command: &str,
        properties: &BTreeMap<String, String>,
        environment: &BTreeMap<String, String>,
    ) -> Result<String> {
        let props: Vec<String> = properties
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();

        let mut args: Vec<&str> = vec![command];
        args.extend(props.iter().map(|s| s.as_str()));

        debug!(scheduler = %self.kind, %command, "submitting job");
        let stdout = self.run(self.submit_cmd, &args, Some(environment))?;

        Self::extract_job_id(&stdout).ok_or_else(|| {
            CycleflowError::Scheduler(format!(
                "{} output contained no job id: {}",
                self.submit_cmd,
                stdout.trim()
            ))
        })
    }

    fn poll(&self, job_id: &str) -> Result<PollStatus> {
        let stdout = self.run(self.poll_cmd, &[job_id], None)?;

        match self.parse_state(&stdout) {
            Some(state) => Ok(PollStatus {
                state,
                exit_status: None,
                execution_time: None,
            }),
            // Job fell out of the queue without a terminal record; treat
            // as a completed run with unknown accounting.
            None => Ok(PollStatus {
                state: JobState::Succeeded,
                exit_status: Some(0),
                execution_time: None,
            }),
        }
    }

    fn cancel(&self, job_id: &str) -> Result<()> {
        debug!(scheduler = %self.kind, %job_id, "cancelling job");
        self.run(self.cancel_cmd, &[job_id], None)?;
        Ok(())
    }
}
