// src/engine.rs

//! The workflow engine: one orchestration pass over the locked state.
//!
//! `run` performs load -> merge model (if changed) -> admit cycles ->
//! run tasks in declaration order for every RUN cycle -> persist, all
//! inside the exclusive state lock. `halt`/`pause`/`resume` are the
//! administrative verbs; they mutate only cycle statuses (halt also
//! cancels in-flight jobs) and are idempotent.
//!
//! The engine is synchronous and single-threaded by design: it is
//! invoked repeatedly by an external driver (cron, a shell loop), and
//! all cluster-side parallelism is observed through polling.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::load_and_validate;
use crate::cycle::{format_cycle, AdmissionController};
use crate::dep::EvalContext;
use crate::errors::Result;
use crate::fs::{ArtifactStore, RealArtifactStore};
use crate::journal::CycleJournal;
use crate::sched::SchedulerRegistry;
use crate::state::{CycleStatus, LockFile, LockOptions, StateStore, WorkflowState};
use crate::task::Task;

/// Target of a control verb.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleSet {
    All,
    Cycles(Vec<DateTime<Utc>>),
}

impl CycleSet {
    /// Resolve against the known cycles; unknown targets are skipped.
    fn resolve(&self, state: &WorkflowState) -> Vec<DateTime<Utc>> {
        match self {
            CycleSet::All => state.cycles.keys().copied().collect(),
            CycleSet::Cycles(cycles) => cycles
                .iter()
                .filter(|cycle| state.cycles.contains_key(cycle))
                .copied()
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub run_lock: LockOptions,
    pub control_lock: LockOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            run_lock: LockOptions::for_run(),
            control_lock: LockOptions::for_control(),
        }
    }
}

pub struct WorkflowEngine {
    workflow_path: PathBuf,
    store: StateStore,
    registry: SchedulerRegistry,
    artifacts: Box<dyn ArtifactStore>,
    options: EngineOptions,
}

impl WorkflowEngine {
    pub fn new(workflow_path: impl Into<PathBuf>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            workflow_path: workflow_path.into(),
            store: StateStore::new(store_path),
            registry: SchedulerRegistry::with_defaults(),
            artifacts: Box::new(RealArtifactStore),
            options: EngineOptions::default(),
        }
    }

    /// Swap in a different adapter registry (tests use mocks).
    pub fn with_registry(mut self, registry: SchedulerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_artifact_store(mut self, artifacts: Box<dyn ArtifactStore>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// One orchestration pass at the current wall-clock time.
    pub fn run(&self) -> Result<()> {
        self.run_at(Utc::now())
    }

    /// One orchestration pass with an injected clock.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<()> {
        let _lock = LockFile::acquire(&self.store.lock_path(), &self.options.run_lock)?;

        // Model problems abort here, before any persisted mutation.
        let mut state = self.refreshed_state(now)?;

        AdmissionController::from_state(&state).admit(&mut state, now);

        let journal = CycleJournal::new(state.log.clone());
        self.expire_cycles(&mut state, now, &journal);
        let result = self.run_cycles(&mut state, now, &journal);

        // The aggregate is written as one unit on both outcomes.
        self.store.save(&state)?;
        result
    }

    /// Cancel running jobs and set HALT for the targeted cycles.
    pub fn halt(&self, cycles: &CycleSet) -> Result<()> {
        self.control(cycles, CycleStatus::Halt)
    }

    /// Set PAUSE for the targeted cycles; running jobs are left alone.
    pub fn pause(&self, cycles: &CycleSet) -> Result<()> {
        self.control(cycles, CycleStatus::Pause)
    }

    /// Set RUN for the targeted cycles.
    pub fn resume(&self, cycles: &CycleSet) -> Result<()> {
        self.control(cycles, CycleStatus::Run)
    }

    /// Whether the workflow has nothing left to do. Realtime workflows
    /// are never done.
    pub fn is_done(&self) -> Result<bool> {
        let _lock = LockFile::acquire(&self.store.lock_path(), &self.options.run_lock)?;
        let state = self.store.load()?.unwrap_or_default();
        Ok(state.is_done())
    }

    /// Load persisted state and fold in the source model if it changed
    /// since the last parse.
    fn refreshed_state(&self, now: DateTime<Utc>) -> Result<WorkflowState> {
        let mut state = self.store.load()?.unwrap_or_default();

        if self.model_dirty(&state)? {
            info!(workflow = %self.workflow_path.display(), "source model changed, reparsing");
            let model = load_and_validate(&self.workflow_path)?;
            state.merge_model(model, self.workflow_path.clone(), now);
            self.store.save(&state)?;
        }

        Ok(state)
    }

    fn model_dirty(&self, state: &WorkflowState) -> Result<bool> {
        if state.source.as_deref() != Some(self.workflow_path.as_path()) {
            return Ok(true);
        }
        let Some(parse_time) = state.parse_time else {
            return Ok(true);
        };
        let mtime = fs::metadata(&self.workflow_path)?.modified()?;
        Ok(DateTime::<Utc>::from(mtime) > parse_time)
    }

    /// Expire RUN cycles that outlived the configured lifespan since
    /// their admission: cancel their in-flight jobs and set EXPIRED.
    fn expire_cycles(&self, state: &mut WorkflowState, now: DateTime<Utc>, journal: &CycleJournal) {
        let Some(lifespan) = state.cycle_lifespan else {
            return;
        };

        let expired: Vec<DateTime<Utc>> = state
            .cycles
            .iter()
            .filter(|(cycle, admitted_at)| {
                state.statuses.get(*cycle) == Some(&CycleStatus::Run)
                    && (now - **admitted_at).num_seconds() > lifespan
            })
            .map(|(cycle, _)| *cycle)
            .collect();

        for cycle in expired {
            info!(cycle = %format_cycle(cycle), lifespan, "cycle expired");
            for task in state.tasks.values_mut() {
                if let Some(adapter) = self.registry.get(task.scheduler) {
                    task.halt(cycle, adapter, journal);
                }
            }
            journal.record(cycle, "This cycle has expired");
            state.statuses.insert(cycle, CycleStatus::Expired);
        }
    }

    /// Run every task, in declaration order, for every RUN cycle.
    ///
    /// The running task is taken out of the ledger so dependency
    /// evaluation sees its peers; task references cannot point at the
    /// running task itself (they must name earlier declarations).
    fn run_cycles(
        &self,
        state: &mut WorkflowState,
        now: DateTime<Utc>,
        journal: &CycleJournal,
    ) -> Result<()> {
        let run_cycles: Vec<DateTime<Utc>> = state
            .statuses
            .iter()
            .filter(|(_, status)| **status == CycleStatus::Run)
            .map(|(cycle, _)| *cycle)
            .collect();
        let order = state.task_order.clone();

        for cycle in run_cycles {
            debug!(cycle = %format_cycle(cycle), "running cycle");
            for id in &order {
                let Some(mut task) = state.tasks.remove(id) else {
                    continue;
                };
                self.run_task(&mut task, cycle, &state.tasks, now, journal);
                state.tasks.insert(id.clone(), task);
            }
        }

        Ok(())
    }

    fn run_task(
        &self,
        task: &mut Task,
        cycle: DateTime<Utc>,
        peers: &HashMap<String, Task>,
        now: DateTime<Utc>,
        journal: &CycleJournal,
    ) {
        let Some(adapter) = self.registry.get(task.scheduler) else {
            // Unreachable with a validated model and a default registry.
            warn!(
                task = %task.id,
                scheduler = %task.scheduler,
                "no adapter registered for scheduler"
            );
            return;
        };

        let ctx = EvalContext {
            tasks: peers,
            artifacts: self.artifacts.as_ref(),
            now,
        };
        task.run(cycle, adapter, &ctx, journal);
    }

    fn control(&self, cycles: &CycleSet, status: CycleStatus) -> Result<()> {
        let _lock = LockFile::acquire(&self.store.lock_path(), &self.options.control_lock)?;

        let Some(mut state) = self.store.load()? else {
            debug!("no persisted state; nothing to control");
            return Ok(());
        };

        let journal = CycleJournal::new(state.log.clone());
        let targets = cycles.resolve(&state);

        for cycle in targets {
            match status {
                CycleStatus::Halt => {
                    journal.record(cycle, "Attempting to halt this cycle");
                    for task in state.tasks.values_mut() {
                        if let Some(adapter) = self.registry.get(task.scheduler) {
                            task.halt(cycle, adapter, &journal);
                        }
                    }
                    journal.record(cycle, "This cycle has been halted");
                }
                CycleStatus::Pause => {
                    journal.record(cycle, "This cycle has been paused");
                }
                CycleStatus::Run => {
                    journal.record(cycle, "Cycle has been resumed");
                }
                // Expiry is decided by the run pass, never by a verb.
                CycleStatus::Expired => {}
            }
            info!(cycle = %format_cycle(cycle), status = ?status, "cycle status set");
            state.statuses.insert(cycle, status);
        }

        self.store.save(&state)?;
        Ok(())
    }
}
