use std::time::{Duration, Instant};

use longhaul::budget::{BudgetGuard, PhaseBudgets};
use longhaul::state::Phase;

#[test]
fn test_budget_ordering_invariant_holds_by_default() {
    let budgets = PhaseBudgets::default();
    assert!(budgets.review_ms < budgets.plan_ms);
    assert!(budgets.plan_ms < budgets.work_ms);
}

#[test]
fn test_guard_signals_one_past_budget() {
    let budgets = PhaseBudgets::default();
    for phase in [Phase::Plan, Phase::Work, Phase::Review] {
        let budget = budgets.budget_for(phase);
        let err = budgets
            .check_elapsed(phase, budget + Duration::from_millis(1))
            .expect_err("one millisecond past budget must signal");
        assert_eq!(err.phase, phase);
        assert_eq!(err.budget_ms, budget.as_millis() as u64);
        assert!(err.elapsed_ms >= err.budget_ms + 1);
    }
}

#[test]
fn test_guard_is_silent_within_budget() {
    let budgets = PhaseBudgets::default();
    for phase in [Phase::Plan, Phase::Work, Phase::Review] {
        let budget = budgets.budget_for(phase);
        assert!(budgets.check_elapsed(phase, budget / 2).is_ok());
        assert!(budgets.check_elapsed(phase, Duration::ZERO).is_ok());
    }
}

#[test]
fn test_guard_bound_to_phase_start() {
    let budgets = PhaseBudgets::default();
    // A guard created just now is within every budget.
    let guard = BudgetGuard::new(&budgets, Phase::Review, Instant::now());
    assert!(guard.check().is_ok());
}

#[test]
fn test_signal_message_carries_amounts() {
    let budgets = PhaseBudgets::default();
    let err = budgets
        .check_elapsed(Phase::Work, Duration::from_millis(250_000))
        .expect_err("over budget");
    let message = err.to_string();
    assert!(message.contains("work"));
    assert!(message.contains("250000"));
    assert!(message.contains("240000"));
}
