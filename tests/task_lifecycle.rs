mod common;

use std::collections::HashMap;

use common::{init_tracing, ts};
use cycleflow::dep::{DependencyNode, EvalContext};
use cycleflow::fs::mock::MockArtifactStore;
use cycleflow::journal::CycleJournal;
use cycleflow::sched::mock::MockScheduler;
use cycleflow::sched::{JobState, PollStatus};
use cycleflow::task::Task;
use cycleflow_test_utils::builders::{ModelBuilder, TaskBuilder};

const DAILY: &str = "202401010000 202401100000 24:00:00";

fn build_task(raw: cycleflow::config::RawTask) -> Task {
    ModelBuilder::new()
        .with_interval("daily", DAILY)
        .with_task(raw)
        .build_task()
}

fn pass_with(task: &mut Task, cycle: &str, sched: &MockScheduler, artifacts: &MockArtifactStore) {
    let tasks = HashMap::new();
    let ctx = EvalContext {
        tasks: &tasks,
        artifacts,
        now: ts(cycle),
    };
    task.run(ts(cycle), sched, &ctx, &CycleJournal::disabled());
}

fn pass(task: &mut Task, cycle: &str, sched: &MockScheduler) {
    pass_with(task, cycle, sched, &MockArtifactStore::new());
}

#[test]
fn submits_when_unconditional() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh @Y@m@d@H").build());
    let sched = MockScheduler::new();

    pass(&mut task, "202401020000", &sched);

    let submitted = sched.submitted();
    assert_eq!(submitted.len(), 1);
    // The action template is resolved against the cycle at submit time.
    assert_eq!(submitted[0].command, "ingest.sh 2024010200");
    assert_eq!(task.tries_for(ts("202401020000")), 1);
    assert!(task.is_running(ts("202401020000")));
}

#[test]
fn resolves_properties_and_environment_per_cycle() {
    init_tracing();
    let mut task = build_task(
        TaskBuilder::new("ingest", "ingest.sh")
            .property("jobname", "ingest_@H")
            .env("CYCLE_DATE", "@Y@m@d")
            .build(),
    );
    let sched = MockScheduler::new();

    pass(&mut task, "202401020000", &sched);

    let submitted = sched.submitted();
    assert_eq!(submitted[0].properties["jobname"], "ingest_00");
    assert_eq!(submitted[0].environment["CYCLE_DATE"], "20240102");
}

#[test]
fn defers_until_dependency_resolves() {
    init_tracing();
    let mut task = build_task(
        TaskBuilder::new("post", "post.sh")
            .dependency(DependencyNode::Datadep {
                path: "/data/@Y@m@d/done".into(),
                age: 0,
            })
            .build(),
    );
    let sched = MockScheduler::new();
    let artifacts = MockArtifactStore::new();

    pass_with(&mut task, "202401020000", &sched, &artifacts);
    assert_eq!(sched.submit_count(), 0);
    // Deferral is not an attempt.
    assert_eq!(task.tries_for(ts("202401020000")), 0);

    artifacts.add_artifact("/data/20240102/done", ts("202401020000"));
    pass_with(&mut task, "202401020000", &sched, &artifacts);
    assert_eq!(sched.submit_count(), 1);
}

#[test]
fn skips_cycles_outside_its_definitions() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").build());
    let sched = MockScheduler::new();

    // 12Z is not generated by the daily-at-midnight definition.
    pass(&mut task, "202401021200", &sched);
    assert_eq!(sched.submit_count(), 0);
}

#[test]
fn success_updates_stats_once() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").build());
    let sched = MockScheduler::new();
    sched.script_all(vec![PollStatus::running(), PollStatus::succeeded(42.0)]);

    pass(&mut task, "202401020000", &sched); // submit
    pass(&mut task, "202401020000", &sched); // poll: RUNNING
    assert!(task.is_running(ts("202401020000")));
    assert_eq!(task.run_count(), 0);

    pass(&mut task, "202401020000", &sched); // poll: SUCCEEDED
    assert!(task.done_okay(ts("202401020000")));
    assert!(task.is_terminal(ts("202401020000")));
    assert_eq!(task.run_count(), 1);
    assert_eq!(task.cumulative_runtime(), 42.0);

    // Terminal tasks are left alone: no more polls, no more submissions.
    pass(&mut task, "202401020000", &sched);
    assert_eq!(sched.submit_count(), 1);
    assert_eq!(task.run_count(), 1);
}

#[test]
fn poll_failure_defers_without_state_change() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").build());
    let sched = MockScheduler::new();

    pass(&mut task, "202401020000", &sched);
    assert_eq!(task.tries_for(ts("202401020000")), 1);

    sched.set_fail_poll(true);
    pass(&mut task, "202401020000", &sched);
    // Nothing moved: same try count, same submission, still in flight.
    assert_eq!(task.tries_for(ts("202401020000")), 1);
    assert_eq!(sched.submit_count(), 1);
    assert!(task.is_running(ts("202401020000")));

    sched.set_fail_poll(false);
    sched.script_job("job-1", vec![PollStatus::succeeded(5.0)]);
    pass(&mut task, "202401020000", &sched);
    assert!(task.done_okay(ts("202401020000")));
}

#[test]
fn crash_resubmits_until_try_budget_is_exhausted() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("flaky", "flaky.sh").tries(2).build());
    let sched = MockScheduler::new();
    sched.script_all(vec![PollStatus::failed(71)]);

    pass(&mut task, "202401020000", &sched); // submit try 1
    assert_eq!(task.tries_for(ts("202401020000")), 1);

    pass(&mut task, "202401020000", &sched); // crash observed, resubmit try 2
    assert_eq!(task.tries_for(ts("202401020000")), 2);
    assert_eq!(sched.submit_count(), 2);
    assert!(!task.is_dead(ts("202401020000")));

    pass(&mut task, "202401020000", &sched); // crash observed, budget gone
    assert!(task.is_dead(ts("202401020000")));
    assert!(task.is_terminal(ts("202401020000")));
    assert!(!task.done_okay(ts("202401020000")));
    assert_eq!(sched.submit_count(), 2);

    // Dead is permanent: further passes do nothing.
    pass(&mut task, "202401020000", &sched);
    assert_eq!(sched.submit_count(), 2);
}

#[test]
fn zero_tries_means_unlimited() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("flaky", "flaky.sh").build());
    let sched = MockScheduler::new();
    sched.script_all(vec![PollStatus::failed(1)]);

    pass(&mut task, "202401020000", &sched);
    for _ in 0..5 {
        pass(&mut task, "202401020000", &sched);
    }
    assert_eq!(sched.submit_count(), 6);
    assert!(!task.is_dead(ts("202401020000")));
}

#[test]
fn submit_failure_counts_a_try_and_retries_next_pass() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").tries(3).build());
    let sched = MockScheduler::new();
    sched.set_fail_submit(true);

    pass(&mut task, "202401020000", &sched);
    // The attempt is burned even though the scheduler rejected it.
    assert_eq!(task.tries_for(ts("202401020000")), 1);
    let job = task.job_for(ts("202401020000")).unwrap();
    assert!(job.scheduler_id.is_none());
    assert_eq!(job.state, JobState::Pending);
    assert_eq!(task.active_jobs(), 0);

    sched.set_fail_submit(false);
    pass(&mut task, "202401020000", &sched);
    assert_eq!(task.tries_for(ts("202401020000")), 2);
    assert_eq!(sched.submit_count(), 1);
    assert!(task.is_running(ts("202401020000")));
}

#[test]
fn throttle_caps_active_jobs_across_cycles() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").throttle(1).build());
    let sched = MockScheduler::new();

    pass(&mut task, "202401020000", &sched);
    assert_eq!(task.active_jobs(), 1);

    // A second cycle is deferred while the first job is in flight.
    pass(&mut task, "202401030000", &sched);
    assert_eq!(sched.submit_count(), 1);
    assert_eq!(task.tries_for(ts("202401030000")), 0);

    sched.script_job("job-1", vec![PollStatus::succeeded(3.0)]);
    pass(&mut task, "202401020000", &sched);
    assert_eq!(task.active_jobs(), 0);

    pass(&mut task, "202401030000", &sched);
    assert_eq!(sched.submit_count(), 2);
}

#[test]
fn jobs_without_scheduler_id_do_not_count_against_throttle() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").throttle(1).build());
    let sched = MockScheduler::new();
    sched.set_fail_submit(true);

    pass(&mut task, "202401020000", &sched);
    assert_eq!(task.active_jobs(), 0);

    // The failed submission does not block other cycles.
    sched.set_fail_submit(false);
    pass(&mut task, "202401030000", &sched);
    assert_eq!(sched.submit_count(), 1);
}

#[test]
fn halt_cancels_in_flight_job_and_keeps_try_history() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").build());
    let sched = MockScheduler::new();

    pass(&mut task, "202401020000", &sched);
    assert!(task.is_running(ts("202401020000")));

    task.halt(ts("202401020000"), &sched, &CycleJournal::disabled());
    assert_eq!(sched.cancelled(), vec!["job-1".to_string()]);
    assert!(task.job_for(ts("202401020000")).is_none());
    assert!(!task.is_running(ts("202401020000")));
    assert_eq!(task.tries_for(ts("202401020000")), 1);

    // A later pass starts over with a fresh submission.
    pass(&mut task, "202401020000", &sched);
    assert_eq!(sched.submit_count(), 2);
}

#[test]
fn halt_leaves_finished_jobs_alone() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").build());
    let sched = MockScheduler::new();
    sched.script_all(vec![PollStatus::succeeded(8.0)]);

    pass(&mut task, "202401020000", &sched);
    pass(&mut task, "202401020000", &sched);
    assert!(task.done_okay(ts("202401020000")));

    task.halt(ts("202401020000"), &sched, &CycleJournal::disabled());
    assert!(sched.cancelled().is_empty());
    // The finished job record survives the halt.
    assert!(task.done_okay(ts("202401020000")));
}

#[test]
fn redefinition_keeps_job_history() {
    init_tracing();
    let mut task = build_task(TaskBuilder::new("ingest", "ingest.sh").build());
    let sched = MockScheduler::new();
    sched.script_all(vec![PollStatus::succeeded(8.0)]);
    pass(&mut task, "202401020000", &sched);
    pass(&mut task, "202401020000", &sched);

    let fresh = build_task(TaskBuilder::new("ingest", "ingest_v2.sh").tries(5).build());
    task.update_definition(fresh);

    assert_eq!(task.action.raw(), "ingest_v2.sh");
    assert_eq!(task.tries, 5);
    assert!(task.done_okay(ts("202401020000")));
    assert_eq!(task.run_count(), 1);
}
