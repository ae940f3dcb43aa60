// src/lib.rs

pub mod cli;
pub mod config;
pub mod cycle;
pub mod dep;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod job;
pub mod journal;
pub mod logging;
pub mod sched;
pub mod state;
pub mod task;

use anyhow::Result;

use crate::cli::{CliArgs, Command, ControlArgs, WorkflowArgs};
use crate::config::load_and_validate;
use crate::cycle::{format_cycle, parse_cycle_timestamp};
use crate::engine::{CycleSet, WorkflowEngine};
use crate::state::StateStore;

/// High-level entry point used by `main.rs`.
pub fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Run(wf) => {
            let engine = engine_for(&wf);
            engine.run()?;
            Ok(())
        }
        Command::Halt(ctl) => {
            let engine = engine_for(&ctl.workflow);
            engine.halt(&cycle_set(&ctl)?)?;
            Ok(())
        }
        Command::Pause(ctl) => {
            let engine = engine_for(&ctl.workflow);
            engine.pause(&cycle_set(&ctl)?)?;
            Ok(())
        }
        Command::Resume(ctl) => {
            let engine = engine_for(&ctl.workflow);
            engine.resume(&cycle_set(&ctl)?)?;
            Ok(())
        }
        Command::Check(wf) => {
            print_check(&wf)?;
            Ok(())
        }
    }
}

fn engine_for(wf: &WorkflowArgs) -> WorkflowEngine {
    WorkflowEngine::new(&wf.workflow, &wf.database)
}

fn cycle_set(ctl: &ControlArgs) -> Result<CycleSet> {
    if ctl.all {
        return Ok(CycleSet::All);
    }
    if ctl.cycle.is_empty() {
        anyhow::bail!("specify --all or at least one --cycle");
    }
    let mut cycles = Vec::with_capacity(ctl.cycle.len());
    for text in &ctl.cycle {
        cycles.push(parse_cycle_timestamp(text)?);
    }
    Ok(CycleSet::Cycles(cycles))
}

/// Validate the document and print a short summary, plus done-ness if a
/// state snapshot already exists. Read-only: no lock is taken and no
/// state is written.
fn print_check(wf: &WorkflowArgs) -> Result<()> {
    let model = load_and_validate(&wf.workflow)?;

    println!("cycleflow check: {}", wf.workflow);
    println!("  realtime = {}", model.realtime);
    println!("  max_flow_rate = {}", model.max_flow_rate);
    if model.cycle_throttle > 0 {
        println!("  cycle_throttle = {}", model.cycle_throttle);
    }
    if let Some(lifespan) = model.cycle_lifespan {
        println!("  cycle_lifespan = {lifespan}s");
    }
    println!("  cycles ({}):", model.cycledefs.len());
    for (id, def) in &model.cycledefs {
        println!("    - {id}: {def:?}");
    }
    println!("  tasks ({}):", model.tasks.len());
    for task in &model.tasks {
        println!("    - {} (scheduler: {})", task.id, task.scheduler);
        if task.tries > 0 {
            println!("        tries: {}", task.tries);
        }
        if task.throttle > 0 {
            println!("        throttle: {}", task.throttle);
        }
        if task.dependency.is_some() {
            println!("        gated by a dependency tree");
        }
    }

    let store = StateStore::new(&wf.database);
    if let Some(state) = store.load()? {
        println!("  known cycles ({}):", state.cycles.len());
        for (cycle, status) in &state.statuses {
            println!("    - {} [{:?}]", format_cycle(*cycle), status);
        }
        println!("  done = {}", state.is_done());
    }

    Ok(())
}
