// src/config/model.rs

//! Source model structures.
//!
//! `RawModel` is the straight serde image of the workflow TOML document.
//! `WorkflowModel` is the checked form produced by
//! [`TryFrom<RawModel>`](super::validate): cycle definitions parsed,
//! scheduler names resolved against the registry enum, dependency trees
//! verified, tasks in declaration order.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::cycle::{CycleDefinition, TimeTemplate};
use crate::dep::DependencyNode;
use crate::task::Task;

/// Raw workflow document, prior to semantic validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawModel {
    pub workflow: RawWorkflow,

    #[serde(default, rename = "cycle")]
    pub cycles: Vec<RawCycle>,

    #[serde(default, rename = "task")]
    pub tasks: Vec<RawTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawWorkflow {
    #[serde(default)]
    pub realtime: bool,

    /// Admission budget in cycles per hour; 0 or absent = no budget.
    #[serde(default)]
    pub max_flow_rate: f64,

    /// Maximum simultaneously active cycles; 0 or absent = unlimited.
    #[serde(default)]
    pub cycle_throttle: u32,

    /// How long a cycle stays active after admission
    /// (`"DD:HH:MM:SS"` or `"HH:MM:SS"`); absent = forever.
    pub cycle_lifespan: Option<String>,

    /// Optional per-cycle journal target (time template).
    pub log: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCycle {
    /// Defaults to the 1-based position in the document.
    pub id: Option<String>,

    /// `"YYYYMMDDHHMM YYYYMMDDHHMM HH:MM:SS"`; exclusive with `cron`.
    pub interval: Option<String>,

    /// `minute hour day month day-of-week year`; exclusive with `interval`.
    pub cron: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub id: String,

    /// Action command template, resolved per cycle.
    pub action: String,

    /// One of the known adapter names (sge, lsf, loadleveler).
    pub scheduler: String,

    /// Maximum submission attempts per cycle; 0 = unlimited.
    #[serde(default)]
    pub tries: u32,

    /// Maximum concurrently active jobs; 0 = unlimited.
    #[serde(default)]
    pub throttle: u32,

    /// `"all"`, `"*"`, omitted (= all defined cycles) or a comma list of
    /// cycle ids.
    pub cycles: Option<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// At most one dependency subtree per task.
    pub dependency: Option<DependencyNode>,
}

/// Validated workflow model, ready to merge into persisted state.
#[derive(Debug, Clone)]
pub struct WorkflowModel {
    pub realtime: bool,
    pub max_flow_rate: f64,
    pub cycle_throttle: u32,
    /// Cycle lifespan in seconds.
    pub cycle_lifespan: Option<i64>,
    pub log: Option<TimeTemplate>,
    pub cycledefs: BTreeMap<String, CycleDefinition>,
    /// Tasks in declaration order with empty runtime state.
    pub tasks: Vec<Task>,
}
