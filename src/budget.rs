//! Per-phase wall-clock budgets.
//!
//! The hosting environment hard-kills any invocation that runs too long, so
//! each phase gets a wall-clock allotment sized comfortably below that
//! ceiling. Most of a phase's time is spent waiting on model round-trips,
//! which is why the budgets are much larger than the compute the phase
//! actually burns. When a phase runs over, the guard raises a typed signal;
//! the state machine checkpoints and yields so the watchdog can resume the
//! task in a fresh invocation.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::state::Phase;

/// Maximum elapsed wall-clock time per phase, in milliseconds.
///
/// Invariant: `review < plan < work`. Review is a quick confirmatory pass,
/// planning needs a few model round-trips, and work carries the bulk of the
/// tool-calling iteration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseBudgets {
    #[serde(default = "default_plan_ms")]
    pub plan_ms: u64,
    #[serde(default = "default_work_ms")]
    pub work_ms: u64,
    #[serde(default = "default_review_ms")]
    pub review_ms: u64,
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            plan_ms: default_plan_ms(),
            work_ms: default_work_ms(),
            review_ms: default_review_ms(),
        }
    }
}

fn default_plan_ms() -> u64 {
    120_000
}
fn default_work_ms() -> u64 {
    240_000
}
fn default_review_ms() -> u64 {
    60_000
}

/// Signal raised when a phase exceeds its time budget.
///
/// Always caught by the state machine, which saves a checkpoint and exits
/// the invocation. The watchdog later resumes the task; the handler that
/// catches this signal must not touch the resume counter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("phase {phase} budget exceeded: {elapsed_ms}ms > {budget_ms}ms, checkpointing for resume")]
pub struct BudgetExceeded {
    pub phase: Phase,
    pub elapsed_ms: u64,
    pub budget_ms: u64,
}

impl PhaseBudgets {
    pub fn budget_for(&self, phase: Phase) -> Duration {
        let ms = match phase {
            Phase::Plan => self.plan_ms,
            Phase::Work => self.work_ms,
            Phase::Review => self.review_ms,
        };
        Duration::from_millis(ms)
    }

    /// Enforce the budget ordering invariant.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.review_ms < self.plan_ms && self.plan_ms < self.work_ms) {
            return Err(format!(
                "phase budgets must satisfy review < plan < work (got review={}ms plan={}ms work={}ms)",
                self.review_ms, self.plan_ms, self.work_ms
            ));
        }
        Ok(())
    }

    /// Check whether the current phase is still within budget.
    ///
    /// Must be called before each model round-trip or tool execution inside
    /// a phase, never after.
    pub fn check(&self, phase: Phase, phase_started: Instant) -> Result<(), BudgetExceeded> {
        self.check_elapsed(phase, phase_started.elapsed())
    }

    /// Budget check against an explicit elapsed duration.
    pub fn check_elapsed(&self, phase: Phase, elapsed: Duration) -> Result<(), BudgetExceeded> {
        let budget = self.budget_for(phase);
        if elapsed > budget {
            return Err(BudgetExceeded {
                phase,
                elapsed_ms: elapsed.as_millis() as u64,
                budget_ms: budget.as_millis() as u64,
            });
        }
        Ok(())
    }
}

/// A budget check bound to one phase of one invocation.
///
/// Bundles the budget table with the phase tag and the instant the current
/// invocation entered the phase, so callers deep in the tool-calling loop
/// can check without threading three arguments around.
#[derive(Debug, Clone)]
pub struct BudgetGuard<'a> {
    budgets: &'a PhaseBudgets,
    phase: Phase,
    phase_started: Instant,
}

impl<'a> BudgetGuard<'a> {
    pub fn new(budgets: &'a PhaseBudgets, phase: Phase, phase_started: Instant) -> Self {
        Self {
            budgets,
            phase,
            phase_started,
        }
    }

    pub fn check(&self) -> Result<(), BudgetExceeded> {
        self.budgets.check(self.phase, self.phase_started)
    }
}
