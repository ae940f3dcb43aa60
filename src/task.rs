// src/task.rs

//! Per-task job lifecycle state machine.
//!
//! For each applicable cycle a task walks `NO_JOB -> SUBMITTED ->
//! {SUCCEEDED | FAILED}`; a failed job is resubmitted until the try
//! budget is exhausted, at which point the task is permanently DEAD for
//! that cycle. SUCCEEDED and DEAD are terminal. Both DEAD and the
//! throttle counter are derived from the job ledger rather than stored,
//! so they can never drift from it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cycle::{format_cycle, CycleDefinition, TimeTemplate};
use crate::dep::{DependencyNode, EvalContext};
use crate::job::Job;
use crate::journal::CycleJournal;
use crate::sched::{SchedulerAdapter, SchedulerKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub action: TimeTemplate,
    pub scheduler: SchedulerKind,
    /// Cycle definitions this task applies to.
    pub cycledefs: Vec<CycleDefinition>,
    /// Maximum submission attempts per cycle; 0 = unlimited.
    pub tries: u32,
    /// Maximum concurrently active jobs across cycles; 0 = unlimited.
    pub throttle: u32,
    pub properties: BTreeMap<String, TimeTemplate>,
    pub environment: BTreeMap<String, TimeTemplate>,
    pub dependency: Option<DependencyNode>,

    // Per-cycle runtime state, preserved across model reloads.
    #[serde(default)]
    jobs: BTreeMap<DateTime<Utc>, Job>,
    #[serde(default)]
    tries_by_cycle: BTreeMap<DateTime<Utc>, u32>,
    #[serde(default)]
    run_count: u64,
    #[serde(default)]
    cumulative_runtime: f64,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        action: TimeTemplate,
        scheduler: SchedulerKind,
        cycledefs: Vec<CycleDefinition>,
        tries: u32,
        throttle: u32,
        properties: BTreeMap<String, TimeTemplate>,
        environment: BTreeMap<String, TimeTemplate>,
        dependency: Option<DependencyNode>,
    ) -> Self {
        Self {
            id: id.into(),
            action,
            scheduler,
            cycledefs,
            tries,
            throttle,
            properties,
            environment,
            dependency,
            jobs: BTreeMap::new(),
            tries_by_cycle: BTreeMap::new(),
            run_count: 0,
            cumulative_runtime: 0.0,
        }
    }

    /// Replace the definition while keeping per-cycle jobs, try counters
    /// and run statistics. Called when the source model is reloaded.
    pub fn update_definition(&mut self, fresh: Task) {
        self.action = fresh.action;
        self.scheduler = fresh.scheduler;
        self.cycledefs = fresh.cycledefs;
        self.tries = fresh.tries;
        self.throttle = fresh.throttle;
        self.properties = fresh.properties;
        self.environment = fresh.environment;
        self.dependency = fresh.dependency;
    }

    pub fn matches_cycle(&self, cycle: DateTime<Utc>) -> bool {
        self.cycledefs.iter().any(|def| def.contains(cycle))
    }

    pub fn job_for(&self, cycle: DateTime<Utc>) -> Option<&Job> {
        self.jobs.get(&cycle)
    }

    pub fn tries_for(&self, cycle: DateTime<Utc>) -> u32 {
        self.tries_by_cycle.get(&cycle).copied().unwrap_or(0)
    }

    /// Throttle counter: jobs accepted by the scheduler and not yet
    /// terminal, across all cycles.
    pub fn active_jobs(&self) -> usize {
        self.jobs.values().filter(|job| job.is_active()).count()
    }

    pub fn done_okay(&self, cycle: DateTime<Utc>) -> bool {
        self.job_for(cycle).is_some_and(Job::done_okay)
    }

    /// Permanently failed for this cycle: the latest job crashed and the
    /// try budget is exhausted.
    pub fn is_dead(&self, cycle: DateTime<Utc>) -> bool {
        self.tries > 0
            && self.tries_for(cycle) >= self.tries
            && self.job_for(cycle).is_some_and(Job::crashed)
    }

    /// SUCCEEDED or DEAD for this cycle.
    pub fn is_terminal(&self, cycle: DateTime<Utc>) -> bool {
        self.done_okay(cycle) || self.is_dead(cycle)
    }

    /// A job exists for this cycle and has not finished.
    pub fn is_running(&self, cycle: DateTime<Utc>) -> bool {
        self.job_for(cycle).is_some_and(|job| !job.is_terminal())
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub fn cumulative_runtime(&self) -> f64 {
        self.cumulative_runtime
    }

    /// One pass of the lifecycle state machine for one cycle.
    ///
    /// Scheduler call failures are absorbed here: a poll failure defers
    /// the task with no state change, a submit failure leaves a job
    /// without a scheduler id so the next pass retries the submission.
    /// At most one submission attempt happens per pass.
    pub fn run(
        &mut self,
        cycle: DateTime<Utc>,
        adapter: &dyn SchedulerAdapter,
        ctx: &EvalContext,
        journal: &CycleJournal,
    ) {
        if !self.matches_cycle(cycle) || self.is_terminal(cycle) {
            return;
        }

        // An existing, accepted job: poll it and react.
        if self.job_for(cycle).is_some_and(|job| job.scheduler_id.is_some()) {
            if self.poll_job(cycle, adapter, journal).is_err() {
                // Poll failure: keep prior state, no try-count advance.
                return;
            }

            let job = &self.jobs[&cycle];
            if !job.crashed() {
                // Queued, running, or just succeeded; nothing to submit.
                return;
            }

            info!(
                task = %self.id,
                cycle = %format_cycle(cycle),
                exit_status = job.exit_status,
                "job crashed"
            );
            journal.record(
                cycle,
                &format!(
                    "{} job id={} crashed, exit status={}",
                    self.id,
                    job.scheduler_id.as_deref().unwrap_or("?"),
                    job.exit_status.map_or_else(|| "?".into(), |s| s.to_string())
                ),
            );

            if self.tries > 0 && self.tries_for(cycle) >= self.tries {
                info!(
                    task = %self.id,
                    cycle = %format_cycle(cycle),
                    tries = self.tries_for(cycle),
                    "try budget exhausted, giving up"
                );
                journal.record(
                    cycle,
                    &format!(
                        "{} has been tried {} times, giving up",
                        self.id,
                        self.tries_for(cycle)
                    ),
                );
                return;
            }

            if self.throttled(cycle, journal) {
                return;
            }
            self.submit(cycle, adapter, journal);
            return;
        }

        // No job yet, or a job the scheduler never accepted: the
        // first-submission path. Dependencies gate this path only.
        let unresolved = self
            .dependency
            .as_ref()
            .is_some_and(|dep| !dep.resolved(cycle, ctx));
        if unresolved {
            debug!(
                task = %self.id,
                cycle = %format_cycle(cycle),
                "dependencies not yet resolved, deferring"
            );
            return;
        }

        if self.throttled(cycle, journal) {
            return;
        }
        self.submit(cycle, adapter, journal);
    }

    /// Cancel and drop the cycle's job if it is still in flight. The try
    /// counter history is preserved.
    pub fn halt(
        &mut self,
        cycle: DateTime<Utc>,
        adapter: &dyn SchedulerAdapter,
        journal: &CycleJournal,
    ) {
        if !self.is_running(cycle) {
            return;
        }
        journal.record(cycle, &format!("Attempting to halt {}", self.id));

        let job = &self.jobs[&cycle];
        if let Some(id) = job.scheduler_id.clone() {
            match job.cancel(adapter) {
                Ok(()) => {
                    journal.record(cycle, &format!("Killed {} job id={}", self.id, id));
                }
                Err(e) => {
                    warn!(
                        task = %self.id,
                        cycle = %format_cycle(cycle),
                        job_id = %id,
                        error = %e,
                        "failed to cancel job"
                    );
                    journal.record(cycle, &format!("{e}"));
                }
            }
        }

        self.jobs.remove(&cycle);
        journal.record(cycle, &format!("{} has been halted", self.id));
    }

    fn throttled(&self, cycle: DateTime<Utc>, journal: &CycleJournal) -> bool {
        if self.throttle > 0 && self.active_jobs() >= self.throttle as usize {
            info!(
                task = %self.id,
                cycle = %format_cycle(cycle),
                throttle = self.throttle,
                "throttle limit reached, deferring"
            );
            journal.record(
                cycle,
                &format!(
                    "{} cannot be submitted now because the maximum throttle ({}) \
                     has been reached",
                    self.id, self.throttle
                ),
            );
            true
        } else {
            false
        }
    }

    /// Poll the cycle's job and fold the outcome into the task stats.
    fn poll_job(
        &mut self,
        cycle: DateTime<Utc>,
        adapter: &dyn SchedulerAdapter,
        journal: &CycleJournal,
    ) -> crate::errors::Result<()> {
        let job = self
            .jobs
            .get_mut(&cycle)
            .ok_or_else(|| crate::errors::CycleflowError::State("missing job".into()))?;

        if let Err(e) = job.poll(adapter) {
            warn!(
                task = %self.id,
                cycle = %format_cycle(cycle),
                error = %e,
                "poll failed, deferring"
            );
            journal.record(cycle, &format!("{e}"));
            return Err(e);
        }

        let id = job.scheduler_id.clone().unwrap_or_default();
        let state = job.state;
        let succeeded = job.done_okay();
        let runtime = job.execution_time;

        journal.record(
            cycle,
            &format!("{} job id={} in state '{}'", self.id, id, state),
        );
        debug!(
            task = %self.id,
            cycle = %format_cycle(cycle),
            job_id = %id,
            state = %state,
            "polled job"
        );

        // The state machine never polls a terminal job again, so this
        // transition is counted exactly once.
        if succeeded {
            let seconds = runtime.unwrap_or(0.0);
            self.run_count += 1;
            self.cumulative_runtime += seconds;
            journal.record(
                cycle,
                &format!("{} job id={} ran for {} seconds", self.id, id, seconds),
            );
        }

        Ok(())
    }

    /// Create a fresh job for this cycle and submit it. The try counter
    /// advances whether or not submission succeeds, bounding retries
    /// even against a permanently broken scheduler.
    fn submit(
        &mut self,
        cycle: DateTime<Utc>,
        adapter: &dyn SchedulerAdapter,
        journal: &CycleJournal,
    ) {
        let command = self.action.resolve(cycle);
        let properties: BTreeMap<String, String> = self
            .properties
            .iter()
            .map(|(name, tmpl)| (name.clone(), tmpl.resolve(cycle)))
            .collect();
        let environment: BTreeMap<String, String> = self
            .environment
            .iter()
            .map(|(name, tmpl)| (name.clone(), tmpl.resolve(cycle)))
            .collect();

        let mut job = Job::new(command, properties, environment);
        let outcome = job.submit(adapter);
        *self.tries_by_cycle.entry(cycle).or_insert(0) += 1;

        match outcome {
            Ok(()) => {
                let id = job.scheduler_id.as_deref().unwrap_or("?");
                info!(
                    task = %self.id,
                    cycle = %format_cycle(cycle),
                    job_id = %id,
                    try_count = self.tries_for(cycle),
                    "submitted job"
                );
                journal.record(cycle, &format!("Submitted {} job id={}", self.id, id));
            }
            Err(e) => {
                warn!(
                    task = %self.id,
                    cycle = %format_cycle(cycle),
                    error = %e,
                    "submission failed"
                );
                journal.record(cycle, &format!("{e}"));
            }
        }

        // Replace any previous record: a retry is a logically new job.
        self.jobs.insert(cycle, job);
    }
}
