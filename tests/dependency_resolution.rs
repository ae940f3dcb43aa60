mod common;

use std::collections::HashMap;

use chrono::Duration;
use common::{init_tracing, leaf, ts};
use cycleflow::dep::{DependencyNode, EvalContext};
use cycleflow::fs::mock::MockArtifactStore;
use cycleflow::journal::CycleJournal;
use cycleflow::sched::mock::MockScheduler;
use cycleflow::sched::{JobState, PollStatus};
use cycleflow::task::Task;
use cycleflow_test_utils::builders::{ModelBuilder, TaskBuilder};

const DAILY: &str = "202401010000 202401100000 24:00:00";

fn eval(dep: &DependencyNode, cycle: &str) -> bool {
    eval_with(dep, cycle, &HashMap::new(), &MockArtifactStore::new(), cycle)
}

fn eval_with(
    dep: &DependencyNode,
    cycle: &str,
    tasks: &HashMap<String, Task>,
    artifacts: &MockArtifactStore,
    now: &str,
) -> bool {
    let ctx = EvalContext {
        tasks,
        artifacts,
        now: ts(now),
    };
    dep.resolved(ts(cycle), &ctx)
}

/// Drive a standalone task through one state-machine pass.
fn pass(task: &mut Task, cycle: &str, sched: &MockScheduler) {
    let tasks = HashMap::new();
    let artifacts = MockArtifactStore::new();
    let ctx = EvalContext {
        tasks: &tasks,
        artifacts: &artifacts,
        now: ts(cycle),
    };
    task.run(ts(cycle), sched, &ctx, &CycleJournal::disabled());
}

/// Build a task and run it to a terminal state for one cycle.
fn finished_task(id: &str, state: JobState) -> Task {
    let mut task = ModelBuilder::new()
        .with_interval("daily", DAILY)
        .with_task(TaskBuilder::new(id, "run.sh").tries(1).build())
        .build_task();

    let sched = MockScheduler::new();
    let script = match state {
        JobState::Succeeded => PollStatus::succeeded(10.0),
        JobState::Failed => PollStatus::failed(1),
        _ => panic!("finished_task needs a terminal state"),
    };
    sched.script_all(vec![script]);

    pass(&mut task, "202401020000", &sched); // submit
    pass(&mut task, "202401020000", &sched); // poll to terminal
    assert!(task.is_terminal(ts("202401020000")));
    task
}

#[test]
fn and_tolerates_max_missing_children() {
    init_tracing();
    let strict = DependencyNode::And {
        max_missing: 0,
        children: vec![leaf(true), leaf(false)],
    };
    assert!(!eval(&strict, "202401020000"));

    let relaxed = DependencyNode::And {
        max_missing: 1,
        children: vec![leaf(true), leaf(false)],
    };
    assert!(eval(&relaxed, "202401020000"));

    let too_relaxed = DependencyNode::And {
        max_missing: 2,
        children: vec![leaf(false), leaf(false)],
    };
    assert!(eval(&too_relaxed, "202401020000"));
}

#[test]
fn boolean_composites() {
    init_tracing();
    let or = DependencyNode::Or {
        children: vec![leaf(false), leaf(true)],
    };
    assert!(eval(&or, "202401020000"));

    let not = DependencyNode::Not {
        child: Box::new(leaf(false)),
    };
    assert!(eval(&not, "202401020000"));

    let nand = DependencyNode::Nand {
        children: vec![leaf(true), leaf(false)],
    };
    assert!(eval(&nand, "202401020000"));

    let nor = DependencyNode::Nor {
        children: vec![leaf(false), leaf(false)],
    };
    assert!(eval(&nor, "202401020000"));
}

#[test]
fn xor_is_exactly_one() {
    init_tracing();
    let one = DependencyNode::Xor {
        children: vec![leaf(true), leaf(false), leaf(false)],
    };
    assert!(eval(&one, "202401020000"));

    let two = DependencyNode::Xor {
        children: vec![leaf(true), leaf(true), leaf(false)],
    };
    assert!(!eval(&two, "202401020000"));

    let none = DependencyNode::Xor {
        children: vec![leaf(false), leaf(false)],
    };
    assert!(!eval(&none, "202401020000"));
}

#[test]
fn some_requires_threshold_hits() {
    init_tracing();
    let dep = DependencyNode::Some {
        threshold: 2,
        children: vec![leaf(true), leaf(false), leaf(true)],
    };
    assert!(eval(&dep, "202401020000"));

    let dep = DependencyNode::Some {
        threshold: 3,
        children: vec![leaf(true), leaf(false), leaf(true)],
    };
    assert!(!eval(&dep, "202401020000"));
}

#[test]
fn taskdep_matches_job_state_at_cycle() {
    init_tracing();
    let mut tasks = HashMap::new();
    tasks.insert("upstream".to_string(), finished_task("upstream", JobState::Succeeded));

    let dep = DependencyNode::Taskdep {
        task: "upstream".to_string(),
        status: JobState::Succeeded,
        cycle_offset: 0,
    };
    let artifacts = MockArtifactStore::new();

    assert!(eval_with(&dep, "202401020000", &tasks, &artifacts, "202401020000"));
    // A different cycle has no job for the upstream task.
    assert!(!eval_with(&dep, "202401030000", &tasks, &artifacts, "202401030000"));
}

#[test]
fn taskdep_cycle_offset_shifts_the_lookup() {
    init_tracing();
    let mut tasks = HashMap::new();
    tasks.insert("upstream".to_string(), finished_task("upstream", JobState::Succeeded));

    // Evaluated one day later, the offset points back at the finished cycle.
    let dep = DependencyNode::Taskdep {
        task: "upstream".to_string(),
        status: JobState::Succeeded,
        cycle_offset: -Duration::days(1).num_seconds(),
    };
    let artifacts = MockArtifactStore::new();
    assert!(eval_with(&dep, "202401030000", &tasks, &artifacts, "202401030000"));
}

#[test]
fn taskdep_on_failure_state() {
    init_tracing();
    let mut tasks = HashMap::new();
    tasks.insert("flaky".to_string(), finished_task("flaky", JobState::Failed));

    let on_failure = DependencyNode::Taskdep {
        task: "flaky".to_string(),
        status: JobState::Failed,
        cycle_offset: 0,
    };
    let on_success = DependencyNode::Taskdep {
        task: "flaky".to_string(),
        status: JobState::Succeeded,
        cycle_offset: 0,
    };
    let artifacts = MockArtifactStore::new();

    assert!(eval_with(&on_failure, "202401020000", &tasks, &artifacts, "202401020000"));
    assert!(!eval_with(&on_success, "202401020000", &tasks, &artifacts, "202401020000"));
}

#[test]
fn taskdep_unknown_task_resolves_false() {
    init_tracing();
    let dep = DependencyNode::Taskdep {
        task: "nobody".to_string(),
        status: JobState::Succeeded,
        cycle_offset: 0,
    };
    assert!(!eval(&dep, "202401020000"));
}

#[test]
fn datadep_existence_and_age() {
    init_tracing();
    let artifacts = MockArtifactStore::new();
    let tasks = HashMap::new();

    let dep = DependencyNode::Datadep {
        path: "/data/@Y@m@d/input.grib".into(),
        age: 0,
    };
    assert!(!eval_with(&dep, "202401020000", &tasks, &artifacts, "202401020600"));

    // The template resolves against the cycle, not "now".
    artifacts.add_artifact("/data/20240102/input.grib", ts("202401020500"));
    assert!(eval_with(&dep, "202401020000", &tasks, &artifacts, "202401020600"));

    // Age-gated: the artifact must have been quiet for at least an hour.
    let aged = DependencyNode::Datadep {
        path: "/data/@Y@m@d/input.grib".into(),
        age: 3600,
    };
    assert!(eval_with(&aged, "202401020000", &tasks, &artifacts, "202401020600"));
    assert!(!eval_with(&aged, "202401020000", &tasks, &artifacts, "202401020530"));
}

#[test]
fn timedep_reaches_templated_target() {
    init_tracing();
    // Gate at 06:30 on the cycle's own date.
    let dep = DependencyNode::Timedep {
        time: "@Y@m@d063000".into(),
    };
    let tasks = HashMap::new();
    let artifacts = MockArtifactStore::new();

    assert!(!eval_with(&dep, "202401020000", &tasks, &artifacts, "202401020629"));
    assert!(eval_with(&dep, "202401020000", &tasks, &artifacts, "202401020630"));
    assert!(eval_with(&dep, "202401020000", &tasks, &artifacts, "202401020700"));
}

#[test]
fn nested_trees_compose() {
    init_tracing();
    // (true AND true) OR NOT(true) -> true; NOT of that -> false.
    let inner = DependencyNode::Or {
        children: vec![
            DependencyNode::And {
                max_missing: 0,
                children: vec![leaf(true), leaf(true)],
            },
            DependencyNode::Not {
                child: Box::new(leaf(true)),
            },
        ],
    };
    assert!(eval(&inner, "202401020000"));

    let outer = DependencyNode::Not {
        child: Box::new(inner),
    };
    assert!(!eval(&outer, "202401020000"));
}
