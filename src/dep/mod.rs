// src/dep/mod.rs

//! Dependency trees: boolean expressions gating task submission.
//!
//! A [`DependencyNode`] is an immutable tree built once when the source
//! model is parsed (serde deserializes straight into it) and shared by
//! reference afterwards; the serialized form is a projection of the same
//! tree. Evaluation is a single recursive descent over the variant tags,
//! pure with respect to orchestration state: it may read other tasks'
//! job states, artifact metadata and the injected clock, but never
//! mutates anything.
//!
//! An unresolved dependency is not an error. It is the normal "not yet"
//! outcome that defers a task to a later pass.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::cycle::TimeTemplate;
use crate::fs::ArtifactStore;
use crate::sched::JobState;
use crate::task::Task;

/// Everything dependency evaluation may look at.
pub struct EvalContext<'a> {
    /// All tasks except the one currently being run.
    pub tasks: &'a HashMap<String, Task>,
    pub artifacts: &'a dyn ArtifactStore,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DependencyNode {
    /// True iff at least `children.len() - max_missing` children are true.
    And {
        #[serde(default)]
        max_missing: usize,
        children: Vec<DependencyNode>,
    },
    /// True iff at least one child is true.
    Or { children: Vec<DependencyNode> },
    /// True iff the child is false.
    Not { child: Box<DependencyNode> },
    /// Negated strict AND.
    Nand { children: Vec<DependencyNode> },
    /// Negated OR.
    Nor { children: Vec<DependencyNode> },
    /// True iff exactly one child is true.
    Xor { children: Vec<DependencyNode> },
    /// True iff at least `threshold` children are true.
    Some {
        threshold: usize,
        children: Vec<DependencyNode>,
    },
    /// True iff the referenced task's job for `cycle + cycle_offset`
    /// reached `status`. A missing task or cycle resolves false.
    Taskdep {
        task: String,
        #[serde(default = "default_taskdep_status")]
        status: JobState,
        /// Signed offset in seconds added to the evaluating cycle.
        #[serde(default)]
        cycle_offset: i64,
    },
    /// True iff the templated artifact exists and is at least `age`
    /// seconds old (age 0: existence only).
    Datadep {
        path: TimeTemplate,
        #[serde(default)]
        age: i64,
    },
    /// True iff wall-clock now has reached the templated target time
    /// (`YYYYMMDDHHMMSS`).
    Timedep { time: TimeTemplate },
}

fn default_taskdep_status() -> JobState {
    JobState::Succeeded
}

impl DependencyNode {
    /// Evaluate this tree for one cycle.
    pub fn resolved(&self, cycle: DateTime<Utc>, ctx: &EvalContext) -> bool {
        match self {
            DependencyNode::And {
                max_missing,
                children,
            } => {
                let hits = count_true(children, cycle, ctx);
                hits + max_missing >= children.len()
            }
            DependencyNode::Or { children } => {
                children.iter().any(|c| c.resolved(cycle, ctx))
            }
            DependencyNode::Not { child } => !child.resolved(cycle, ctx),
            DependencyNode::Nand { children } => {
                !children.iter().all(|c| c.resolved(cycle, ctx))
            }
            DependencyNode::Nor { children } => {
                !children.iter().any(|c| c.resolved(cycle, ctx))
            }
            DependencyNode::Xor { children } => count_true(children, cycle, ctx) == 1,
            DependencyNode::Some {
                threshold,
                children,
            } => count_true(children, cycle, ctx) >= *threshold,
            DependencyNode::Taskdep {
                task,
                status,
                cycle_offset,
            } => {
                let target = cycle + Duration::seconds(*cycle_offset);
                ctx.tasks
                    .get(task)
                    .and_then(|t| t.job_for(target))
                    .is_some_and(|job| job.state == *status)
            }
            DependencyNode::Datadep { path, age } => {
                let resolved = path.resolve(cycle);
                let path = Path::new(&resolved);
                if *age <= 0 {
                    return ctx.artifacts.exists(path);
                }
                match ctx.artifacts.modified(path) {
                    Some(mtime) => (ctx.now - mtime).num_seconds() >= *age,
                    None => false,
                }
            }
            DependencyNode::Timedep { time } => match parse_target(&time.resolve(cycle)) {
                Some(target) => ctx.now >= target,
                None => false,
            },
        }
    }

    /// Child nodes, for validation walks. Leaves yield an empty slice.
    pub fn children(&self) -> &[DependencyNode] {
        match self {
            DependencyNode::And { children, .. }
            | DependencyNode::Or { children }
            | DependencyNode::Nand { children }
            | DependencyNode::Nor { children }
            | DependencyNode::Xor { children }
            | DependencyNode::Some { children, .. } => children,
            DependencyNode::Not { child } => std::slice::from_ref(child),
            _ => &[],
        }
    }
}

fn count_true(children: &[DependencyNode], cycle: DateTime<Utc>, ctx: &EvalContext) -> usize {
    children.iter().filter(|c| c.resolved(cycle, ctx)).count()
}

/// Parse a resolved `timedep` target (`YYYYMMDDHHMMSS`).
pub fn parse_target(text: &str) -> Option<DateTime<Utc>> {
    let naive = chrono::NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
