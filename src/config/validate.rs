// src/config/validate.rs

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use regex::Regex;

use crate::config::model::{RawCycle, RawModel, RawTask, WorkflowModel};
use crate::cycle::{CycleDefinition, TimeTemplate};
use crate::dep::DependencyNode;
use crate::errors::{CycleflowError, Result};
use crate::sched::SchedulerKind;
use crate::task::Task;

impl TryFrom<RawModel> for WorkflowModel {
    type Error = CycleflowError;

    fn try_from(raw: RawModel) -> std::result::Result<Self, Self::Error> {
        if raw.workflow.max_flow_rate < 0.0 {
            return Err(CycleflowError::Model(
                "[workflow].max_flow_rate must be non-negative".to_string(),
            ));
        }

        let cycle_lifespan = match raw.workflow.cycle_lifespan.as_deref() {
            Some(text) => Some(crate::cycle::parse_duration(text).map_err(|_| {
                CycleflowError::Model(format!(
                    "[workflow].cycle_lifespan '{}' must be a positive \
                     DD:HH:MM:SS or HH:MM:SS duration",
                    text
                ))
            })?),
            None => None,
        };

        let cycledefs = validate_cycles(&raw.cycles)?;

        let mut tasks = Vec::with_capacity(raw.tasks.len());
        let mut seen: HashSet<String> = HashSet::new();
        for raw_task in &raw.tasks {
            let task = validate_task(raw_task, &cycledefs, &seen)?;
            seen.insert(task.id.clone());
            tasks.push(task);
        }

        Ok(WorkflowModel {
            realtime: raw.workflow.realtime,
            max_flow_rate: raw.workflow.max_flow_rate,
            cycle_throttle: raw.workflow.cycle_throttle,
            cycle_lifespan,
            log: raw.workflow.log.map(TimeTemplate::new),
            cycledefs,
            tasks,
        })
    }
}

fn validate_cycles(raw: &[RawCycle]) -> Result<BTreeMap<String, CycleDefinition>> {
    let mut defs = BTreeMap::new();

    for (index, cycle) in raw.iter().enumerate() {
        let id = cycle
            .id
            .clone()
            .unwrap_or_else(|| (index + 1).to_string());

        let def = match (&cycle.interval, &cycle.cron) {
            (Some(interval), None) => CycleDefinition::parse_interval(interval)?,
            (None, Some(cron)) => CycleDefinition::parse_cron(cron)?,
            _ => {
                return Err(CycleflowError::Model(format!(
                    "cycle '{}' must define exactly one of 'interval' or 'cron'",
                    id
                )));
            }
        };

        if defs.insert(id.clone(), def).is_some() {
            return Err(CycleflowError::Model(format!(
                "duplicate definition of cycle with id='{}'",
                id
            )));
        }
    }

    Ok(defs)
}

fn validate_task(
    raw: &RawTask,
    cycledefs: &BTreeMap<String, CycleDefinition>,
    earlier_tasks: &HashSet<String>,
) -> Result<Task> {
    if raw.id.trim().is_empty() {
        return Err(CycleflowError::Model(
            "task is missing the mandatory 'id' attribute".to_string(),
        ));
    }
    if earlier_tasks.contains(&raw.id) {
        return Err(CycleflowError::Model(format!(
            "duplicate definition of task with id='{}'",
            raw.id
        )));
    }
    if raw.action.trim().is_empty() {
        return Err(CycleflowError::Model(format!(
            "task '{}' is missing the mandatory 'action' attribute",
            raw.id
        )));
    }

    let scheduler = SchedulerKind::from_str(&raw.scheduler).map_err(|e| {
        CycleflowError::Model(format!("task '{}': {}", raw.id, e))
    })?;

    let task_cycledefs = match raw.cycles.as_deref() {
        None | Some("all") | Some("*") => cycledefs.values().cloned().collect(),
        Some(list) => {
            let mut defs = Vec::new();
            for cycle_id in list.split(',').map(str::trim) {
                let def = cycledefs.get(cycle_id).ok_or_else(|| {
                    CycleflowError::Model(format!(
                        "task '{}' refers to a cycle ({}) that has not been defined",
                        raw.id, cycle_id
                    ))
                })?;
                defs.push(def.clone());
            }
            defs
        }
    };

    if let Some(dep) = &raw.dependency {
        validate_dependency(&raw.id, dep, earlier_tasks)?;
    }

    Ok(Task::new(
        raw.id.clone(),
        TimeTemplate::new(&*raw.action),
        scheduler,
        task_cycledefs,
        raw.tries,
        raw.throttle,
        raw.properties
            .iter()
            .map(|(name, value)| (name.clone(), TimeTemplate::new(&**value)))
            .collect(),
        raw.environment
            .iter()
            .map(|(name, value)| (name.clone(), TimeTemplate::new(&**value)))
            .collect(),
        raw.dependency.clone(),
    ))
}

/// Walk a dependency tree and reject malformed nodes.
///
/// Task references must point at tasks declared *earlier* in the
/// document, which also rules out self-references and reference cycles
/// by construction.
fn validate_dependency(
    task_id: &str,
    node: &DependencyNode,
    earlier_tasks: &HashSet<String>,
) -> Result<()> {
    match node {
        DependencyNode::And {
            max_missing,
            children,
        } => {
            require_children(task_id, "and", children)?;
            if *max_missing > children.len() {
                return Err(CycleflowError::Model(format!(
                    "task '{}': 'and' max_missing ({}) exceeds child count ({})",
                    task_id,
                    max_missing,
                    children.len()
                )));
            }
        }
        DependencyNode::Or { children }
        | DependencyNode::Nand { children }
        | DependencyNode::Nor { children }
        | DependencyNode::Xor { children } => {
            require_children(task_id, "composite", children)?;
        }
        DependencyNode::Some {
            threshold,
            children,
        } => {
            require_children(task_id, "some", children)?;
            if *threshold == 0 || *threshold > children.len() {
                return Err(CycleflowError::Model(format!(
                    "task '{}': 'some' threshold ({}) must be between 1 and \
                     the child count ({})",
                    task_id,
                    threshold,
                    children.len()
                )));
            }
        }
        DependencyNode::Not { .. } => {}
        DependencyNode::Taskdep { task, .. } => {
            if !earlier_tasks.contains(task) {
                return Err(CycleflowError::Model(format!(
                    "task '{}': taskdep refers to a task ('{}') that has not \
                     been previously defined",
                    task_id, task
                )));
            }
        }
        DependencyNode::Datadep { age, .. } => {
            if *age < 0 {
                return Err(CycleflowError::Model(format!(
                    "task '{}': datadep age must be a non-negative integer",
                    task_id
                )));
            }
        }
        DependencyNode::Timedep { time } => {
            // Resolve against a probe timestamp; the shape must come out
            // as YYYYMMDDHHMMSS regardless of the cycle.
            let resolved = time.resolve(chrono::DateTime::UNIX_EPOCH);
            let pattern = Regex::new(r"^[0-9]{14}$").expect("static regex");
            if !pattern.is_match(&resolved) {
                return Err(CycleflowError::Model(format!(
                    "task '{}': timedep '{}' must resolve to YYYYMMDDHHMMSS",
                    task_id,
                    time.raw()
                )));
            }
        }
    }

    for child in node.children() {
        validate_dependency(task_id, child, earlier_tasks)?;
    }

    Ok(())
}

fn require_children(task_id: &str, kind: &str, children: &[DependencyNode]) -> Result<()> {
    if children.is_empty() {
        return Err(CycleflowError::Model(format!(
            "task '{}': '{}' dependency must have at least one child",
            task_id, kind
        )));
    }
    Ok(())
}
