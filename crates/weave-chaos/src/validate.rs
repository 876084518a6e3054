//! Post-run invariant validation (`spec.md` §4.8).
//!
//! A run's outcome is checked in three tiers, matching the original chaos
//! matrix: an in-run invariant failure or event-cap hit always fails the
//! run outright; otherwise, explicit `test.invariants` are checked in
//! declared order; and only when none are declared do the built-in fallback
//! checks (balance sanity, balance conservation, the `score == actions * 10`
//! race detector) run at all. Explicit invariants always take precedence —
//! they are the author's own definition of correctness for this blueprint.

use std::sync::Arc;

use weave_expr::{Engine, MapContext, RootContext};
use weave_kernel::{RunOutcome, RunReport};
use weave_types::{Blueprint, EventAction, Row, TestInvariant, Value};

use crate::view::{event_to_value, SnapshotRootView};

/// Checks a completed run against its (possibly fuzzed) blueprint's
/// `test.invariants`, falling back to built-in checks when none are
/// declared. Returns the first violation found, if any.
pub(crate) fn validate_run(blueprint: &Arc<Blueprint>, report: &RunReport) -> Option<String> {
    match &report.outcome {
        RunOutcome::InvariantFailed { invariant } => {
            return Some(format!("invariant '{invariant}' failed during the run"));
        }
        RunOutcome::EventCapReached => {
            return Some("event cap reached (probable livelock)".to_string());
        }
        RunOutcome::Completed => {}
    }

    if !blueprint.test_invariants.is_empty() {
        return blueprint
            .test_invariants
            .iter()
            .find_map(|invariant| check_explicit_invariant(blueprint, report, invariant));
    }

    check_builtin_fallbacks(report)
}

fn check_explicit_invariant(blueprint: &Arc<Blueprint>, report: &RunReport, invariant: &TestInvariant) -> Option<String> {
    match invariant {
        TestInvariant::Builtin { name } => check_builtin_named(report, name),
        TestInvariant::FinalState { expression } => {
            let root = SnapshotRootView::new(blueprint.clone(), report.final_state.clone());
            let ctx = RootContext::new(Arc::new(root));
            if Engine::new().eval(expression, &ctx).truthy() {
                None
            } else {
                Some(format!("final-state invariant failed: {expression}"))
            }
        }
        TestInvariant::Ltl { always, eventually } => check_ltl(blueprint, report, always, eventually),
    }
}

fn check_builtin_named(report: &RunReport, name: &str) -> Option<String> {
    match name {
        "score_matches_action_count" => check_score_matches_action_count(report),
        "total_balance_conserved" => check_balance_conserved(report),
        other => {
            tracing::warn!(name = other, "unknown builtin invariant name, skipping");
            None
        }
    }
}

fn check_builtin_fallbacks(report: &RunReport) -> Option<String> {
    check_balance_sanity(report)
        .or_else(|| check_balance_conserved(report))
        .or_else(|| check_score_matches_action_count(report))
}

/// Auto-detected sanity checks over every column whose name contains
/// `"balance"`: never negative, never null, never infinite.
fn check_balance_sanity(report: &RunReport) -> Option<String> {
    for ((component, table), rows) in &report.final_state {
        for row in rows {
            if let Some(message) = check_balance_columns_in_row(component, table, row) {
                return Some(message);
            }
        }
    }
    None
}

fn check_balance_columns_in_row(component: &str, table: &str, row: &Row) -> Option<String> {
    for (column, value) in row {
        if !column.to_lowercase().contains("balance") {
            continue;
        }
        match value {
            Value::Null => return Some(format!("NULL balance in {component}.{table}.{column}")),
            Value::Int(i) if *i < 0 => {
                return Some(format!("negative balance in {component}.{table}.{column}: {i}"))
            }
            Value::Float(f) if *f < 0.0 => {
                return Some(format!("negative balance in {component}.{table}.{column}: {f}"))
            }
            Value::Float(f) if f.is_infinite() => {
                return Some(format!("infinite balance in {component}.{table}.{column}"))
            }
            _ => {}
        }
    }
    None
}

fn sum_balance_columns(state: &std::collections::HashMap<(String, String), Vec<Row>>) -> f64 {
    state
        .values()
        .flat_map(|rows| rows.iter())
        .flat_map(|row| row.iter())
        .filter(|(column, _)| column.to_lowercase().contains("balance"))
        .filter_map(|(_, value)| match value {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        })
        .sum()
}

/// Total of every `*balance*` column must be conserved between initial and
/// final state, within floating-point tolerance. Skipped entirely when the
/// blueprint has no balance-bearing initial state (nothing to conserve).
fn check_balance_conserved(report: &RunReport) -> Option<String> {
    let initial_total = sum_balance_columns(&report.initial_state);
    if initial_total == 0.0 {
        return None;
    }
    let final_total = sum_balance_columns(&report.final_state);
    if (final_total - initial_total).abs() > 0.01 {
        let verb = if final_total > initial_total { "created" } else { "destroyed" };
        return Some(format!(
            "balance not conserved: final={final_total:.2}, expected={initial_total:.2} (money {verb})"
        ));
    }
    None
}

/// Race-condition detector: every `score` column should equal the number of
/// handler invocations the run recorded, times ten. A generalization of the
/// original's per-player `PlayerAction`-counting check: here "action" means
/// any handler invocation, since a generic blueprint has no fixed notion of
/// a player-triggering message name.
fn check_score_matches_action_count(report: &RunReport) -> Option<String> {
    let action_count = report
        .events
        .iter()
        .filter(|e| e.action == EventAction::HandlerExec)
        .count() as i64;
    if action_count == 0 {
        return None;
    }
    let expected = action_count * 10;
    for ((component, table), rows) in &report.final_state {
        for row in rows {
            let Some(value) = row.get("score") else { continue };
            let actual = match value {
                Value::Int(i) => *i,
                Value::Float(f) => *f as i64,
                _ => continue,
            };
            if actual != expected {
                return Some(format!(
                    "RACE CONDITION: score={actual}, expected={expected} ({component}.{table}, {action_count} handler invocations)"
                ));
            }
        }
    }
    None
}

/// `always(A -> eventually(B))`: every event matching `always` must be
/// followed, somewhere later in the log or in final state, by an event (or
/// final-state condition) matching `eventually`.
fn check_ltl(blueprint: &Arc<Blueprint>, report: &RunReport, always: &str, eventually: &str) -> Option<String> {
    let engine = Engine::new();
    let root = SnapshotRootView::new(blueprint.clone(), report.final_state.clone());
    let final_state_ctx = RootContext::new(Arc::new(root));
    let eventually_in_final_state = engine.eval(eventually, &final_state_ctx).truthy();

    for (i, event) in report.events.iter().enumerate() {
        let antecedent_ctx: MapContext = MapContext::new().with("event", event_to_value(event));
        if !engine.eval(always, &antecedent_ctx).truthy() {
            continue;
        }
        let satisfied_later = report.events[i + 1..].iter().any(|later| {
            let ctx = MapContext::new().with("event", event_to_value(later));
            engine.eval(eventually, &ctx).truthy()
        });
        if !satisfied_later && !eventually_in_final_state {
            return Some(format!("LTL invariant failed: always({always} -> eventually({eventually}))"));
        }
    }
    None
}
