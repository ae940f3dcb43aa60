// src/cycle/admission.rs

//! Cycle admission: which cycle timestamps become active.
//!
//! Realtime workflows track the wall clock: the latest timestamp any
//! definition generates at or before "now" is admitted. Retrospective
//! workflows backfill history oldest-first under a flow-rate budget so a
//! massive catch-up cannot flood the cluster.
//!
//! An optional cycle throttle additionally caps how many cycles may be
//! active at once, on top of the flow-rate budget.
//!
//! Admission only ever appends: existing cycles are never reordered or
//! removed here.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::cycle::format_cycle;
use crate::state::{CycleStatus, WorkflowState};

#[derive(Debug, Clone, Copy)]
pub struct AdmissionController {
    pub realtime: bool,
    /// Cycles per hour; fractional allowed. <= 0 means no budget.
    pub max_flow_rate: f64,
    /// Maximum simultaneously active cycles; 0 means unlimited.
    pub cycle_throttle: u32,
}

impl AdmissionController {
    pub fn from_state(state: &WorkflowState) -> Self {
        Self {
            realtime: state.realtime,
            max_flow_rate: state.max_flow_rate,
            cycle_throttle: state.cycle_throttle,
        }
    }

    /// Admit new cycles into `state`. Returns the admitted timestamps.
    pub fn admit(&self, state: &mut WorkflowState, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        if self.cycle_throttle > 0 && state.active_cycles() >= self.cycle_throttle as usize {
            debug!(
                cycle_throttle = self.cycle_throttle,
                active = state.active_cycles(),
                "cycle throttle reached, admitting nothing"
            );
            return Vec::new();
        }

        let admitted = if self.realtime {
            self.admit_realtime(state, now)
        } else {
            self.admit_retrospective(state, now)
        };

        for cycle in &admitted {
            info!(cycle = %format_cycle(*cycle), "admitted cycle");
        }
        admitted
    }

    /// Latest generated timestamp not after now, across all definitions.
    fn admit_realtime(&self, state: &mut WorkflowState, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let newest = state
            .cycledefs
            .values()
            .filter_map(|def| def.previous(now))
            .max();

        match newest {
            Some(cycle) if !state.cycles.contains_key(&cycle) => {
                state.admit_cycle(cycle, now, CycleStatus::Run);
                vec![cycle]
            }
            _ => Vec::new(),
        }
    }

    fn admit_retrospective(
        &self,
        state: &mut WorkflowState,
        now: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let headroom = if self.cycle_throttle == 0 {
            usize::MAX
        } else {
            (self.cycle_throttle as usize).saturating_sub(state.active_cycles())
        };
        let budget = self.admission_budget(state, now).min(headroom);
        let mut admitted = Vec::new();

        for _ in 0..budget {
            let reference = state
                .cycles
                .keys()
                .next_back()
                .copied()
                .unwrap_or(DateTime::UNIX_EPOCH);

            // Earliest candidate strictly after the most recently
            // admitted cycle, skipping timestamps already present.
            let candidate = state
                .cycledefs
                .values()
                .filter_map(|def| {
                    let mut after = reference;
                    loop {
                        let next = def.next(after)?;
                        if !state.cycles.contains_key(&next) {
                            return Some(next);
                        }
                        after = next;
                    }
                })
                .min();

            match candidate {
                Some(cycle) => {
                    state.admit_cycle(cycle, now, CycleStatus::Run);
                    admitted.push(cycle);
                }
                None => break,
            }
        }

        admitted
    }

    /// How many cycles may be admitted this pass.
    ///
    /// With no budget, exactly one cycle per invocation: unconditional
    /// catch-up. Otherwise the fractional part of the budget sets the
    /// lookback window (`round(1/frac)` hours) and the cap per window
    /// (`round(rate/frac)`), and the pass may admit the headroom left in
    /// the trailing window.
    fn admission_budget(&self, state: &WorkflowState, now: DateTime<Utc>) -> usize {
        if self.max_flow_rate <= 0.0 {
            return 1;
        }

        let frac = self.max_flow_rate.fract();
        let denominator = if frac == 0.0 { 1.0 } else { frac };

        let lookback_hours = (1.0 / denominator).round() as i64;
        let max_cycles = (self.max_flow_rate / denominator).round() as usize;

        let window_start = now - Duration::hours(lookback_hours);
        let recent = state
            .cycles
            .values()
            .filter(|admitted_at| **admitted_at > window_start)
            .count();

        let budget = max_cycles.saturating_sub(recent);
        debug!(
            max_flow_rate = self.max_flow_rate,
            lookback_hours,
            max_cycles,
            recent,
            budget,
            "retrospective admission budget"
        );
        budget
    }
}
