// src/state/mod.rs

//! Persisted orchestration state.
//!
//! [`WorkflowState`] is the single aggregate that travels between
//! invocations: cycle maps, task ledger, declaration order and the
//! workflow-level attributes merged from the source model. It is read
//! and written as one unit under the state lock ([`lock`]) through the
//! versioned JSON store ([`store`]).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WorkflowModel;
use crate::cycle::{CycleDefinition, TimeTemplate};
use crate::sched::SchedulerKind;
use crate::task::Task;

pub mod lock;
pub mod store;

pub use lock::{LockFile, LockOptions};
pub use store::StateStore;

/// Per-cycle control status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CycleStatus {
    Run,
    Halt,
    Pause,
    /// The cycle outlived its configured lifespan; terminal unless an
    /// operator resumes it explicitly.
    Expired,
}

/// The persisted aggregate. A crash never leaves a partial update:
/// readers always see either the old or the new complete snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Identity of the source document last merged in.
    pub source: Option<PathBuf>,
    pub parse_time: Option<DateTime<Utc>>,

    pub realtime: bool,
    pub max_flow_rate: f64,
    /// Maximum simultaneously active cycles; 0 = unlimited.
    #[serde(default)]
    pub cycle_throttle: u32,
    /// Cycle lifespan in seconds; `None` = forever.
    #[serde(default)]
    pub cycle_lifespan: Option<i64>,
    /// Per-cycle journal target, if the document configures one.
    pub log: Option<TimeTemplate>,

    pub cycledefs: BTreeMap<String, CycleDefinition>,

    /// Active cycles: canonical UTC timestamp -> wall-clock admit time.
    pub cycles: BTreeMap<DateTime<Utc>, DateTime<Utc>>,
    pub statuses: BTreeMap<DateTime<Utc>, CycleStatus>,

    pub tasks: HashMap<String, Task>,
    /// Strict total order over task ids (declaration order).
    pub task_order: Vec<String>,

    /// Scheduler names referenced by the model; adapter instances are
    /// rebuilt from these on every invocation.
    pub schedulers: BTreeSet<SchedulerKind>,
}

impl WorkflowState {
    pub fn admit_cycle(
        &mut self,
        cycle: DateTime<Utc>,
        admitted_at: DateTime<Utc>,
        status: CycleStatus,
    ) {
        self.cycles.insert(cycle, admitted_at);
        self.statuses.insert(cycle, status);
    }

    /// Fold a freshly validated model into the aggregate. Existing
    /// tasks keep their per-cycle job history; tasks absent from the new
    /// model are dropped; cycles are never dropped.
    pub fn merge_model(
        &mut self,
        model: WorkflowModel,
        source: PathBuf,
        parsed_at: DateTime<Utc>,
    ) {
        self.source = Some(source);
        self.parse_time = Some(parsed_at);
        self.realtime = model.realtime;
        self.max_flow_rate = model.max_flow_rate;
        self.cycle_throttle = model.cycle_throttle;
        self.cycle_lifespan = model.cycle_lifespan;
        self.log = model.log;
        self.cycledefs = model.cycledefs;

        self.schedulers = model.tasks.iter().map(|t| t.scheduler).collect();
        self.task_order = model.tasks.iter().map(|t| t.id.clone()).collect();

        for task in model.tasks {
            match self.tasks.get_mut(&task.id) {
                Some(existing) => existing.update_definition(task),
                None => {
                    self.tasks.insert(task.id.clone(), task);
                }
            }
        }

        let order = &self.task_order;
        self.tasks.retain(|id, _| order.contains(id));
    }

    /// Cycles still being worked: RUN status and not yet done. This is
    /// the count the cycle throttle caps.
    pub fn active_cycles(&self) -> usize {
        self.cycles
            .keys()
            .filter(|cycle| {
                self.statuses.get(cycle) == Some(&CycleStatus::Run)
                    && !self.cycle_done(**cycle)
            })
            .count()
    }

    /// A cycle is done when every applicable task SUCCEEDED for it, or
    /// at least one task is permanently DEAD for it.
    pub fn cycle_done(&self, cycle: DateTime<Utc>) -> bool {
        self.tasks
            .values()
            .filter(|task| task.matches_cycle(cycle))
            .all(|task| task.done_okay(cycle))
            || self.tasks.values().any(|task| task.is_dead(cycle))
    }

    /// Realtime workflows are never done; retrospective workflows are
    /// done once every known cycle is (expiry counts as done).
    pub fn is_done(&self) -> bool {
        if self.realtime {
            return false;
        }
        self.cycles.keys().all(|cycle| {
            self.statuses.get(cycle) == Some(&CycleStatus::Expired) || self.cycle_done(*cycle)
        })
    }
}
