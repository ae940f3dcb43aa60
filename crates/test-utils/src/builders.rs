#![allow(dead_code)]

use std::collections::BTreeMap;

use cycleflow::config::{RawCycle, RawModel, RawTask, RawWorkflow, WorkflowModel};
use cycleflow::dep::DependencyNode;
use cycleflow::task::Task;

/// Builder for `WorkflowModel` to simplify test setup.
pub struct ModelBuilder {
    model: RawModel,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            model: RawModel {
                workflow: RawWorkflow::default(),
                cycles: Vec::new(),
                tasks: Vec::new(),
            },
        }
    }

    pub fn realtime(mut self, val: bool) -> Self {
        self.model.workflow.realtime = val;
        self
    }

    pub fn max_flow_rate(mut self, rate: f64) -> Self {
        self.model.workflow.max_flow_rate = rate;
        self
    }

    pub fn cycle_throttle(mut self, val: u32) -> Self {
        self.model.workflow.cycle_throttle = val;
        self
    }

    pub fn cycle_lifespan(mut self, val: &str) -> Self {
        self.model.workflow.cycle_lifespan = Some(val.to_string());
        self
    }

    pub fn log(mut self, template: &str) -> Self {
        self.model.workflow.log = Some(template.to_string());
        self
    }

    pub fn with_interval(mut self, id: &str, spec: &str) -> Self {
        self.model.cycles.push(RawCycle {
            id: Some(id.to_string()),
            interval: Some(spec.to_string()),
            cron: None,
        });
        self
    }

    pub fn with_cron(mut self, id: &str, spec: &str) -> Self {
        self.model.cycles.push(RawCycle {
            id: Some(id.to_string()),
            interval: None,
            cron: Some(spec.to_string()),
        });
        self
    }

    pub fn with_task(mut self, task: RawTask) -> Self {
        self.model.tasks.push(task);
        self
    }

    pub fn build(self) -> WorkflowModel {
        WorkflowModel::try_from(self.model).expect("Failed to build valid model from builder")
    }

    /// Build and validate, then hand back the single task. Panics unless
    /// exactly one task was declared.
    pub fn build_task(self) -> Task {
        let mut model = self.build();
        assert_eq!(model.tasks.len(), 1, "build_task expects exactly one task");
        model.tasks.remove(0)
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RawTask`.
pub struct TaskBuilder {
    task: RawTask,
}

impl TaskBuilder {
    pub fn new(id: &str, action: &str) -> Self {
        Self {
            task: RawTask {
                id: id.to_string(),
                action: action.to_string(),
                scheduler: "sge".to_string(),
                tries: 0,
                throttle: 0,
                cycles: None,
                properties: BTreeMap::new(),
                environment: BTreeMap::new(),
                dependency: None,
            },
        }
    }

    pub fn scheduler(mut self, name: &str) -> Self {
        self.task.scheduler = name.to_string();
        self
    }

    pub fn tries(mut self, val: u32) -> Self {
        self.task.tries = val;
        self
    }

    pub fn throttle(mut self, val: u32) -> Self {
        self.task.throttle = val;
        self
    }

    pub fn cycles(mut self, list: &str) -> Self {
        self.task.cycles = Some(list.to_string());
        self
    }

    pub fn property(mut self, name: &str, value: &str) -> Self {
        self.task.properties.insert(name.to_string(), value.to_string());
        self
    }

    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.task.environment.insert(name.to_string(), value.to_string());
        self
    }

    pub fn dependency(mut self, dep: DependencyNode) -> Self {
        self.task.dependency = Some(dep);
        self
    }

    pub fn build(self) -> RawTask {
        self.task
    }
}
