//! Parallel chaos batch driver (`spec.md` §4.8).

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{info, warn};

use weave_coverage::{compute_score, compute_state_fingerprint, CoverageTracker};
use weave_fuzz::{FuzzingConfig, InputFuzzer, StateFuzzer};
use weave_kernel::Kernel;
use weave_types::Blueprint;

use crate::config::ChaosConfig;
use crate::error::ChaosError;
use crate::result::{ChaosMatrixStats, SimulationResult};
use crate::validate::validate_run;

/// Drives many isolated simulation runs over a contiguous seed range,
/// tracking cross-run state coverage and aggregating a reliability report
/// (`spec.md` §4.8).
pub struct ChaosMatrix {
    blueprint: Arc<Blueprint>,
    config: ChaosConfig,
    coverage: Option<Arc<CoverageTracker>>,
}

impl ChaosMatrix {
    /// Builds a matrix over `blueprint` with `config`.
    pub fn new(blueprint: Arc<Blueprint>, config: ChaosConfig) -> Self {
        let coverage = config.track_coverage.then(|| Arc::new(CoverageTracker::new()));
        Self {
            blueprint,
            config,
            coverage,
        }
    }

    /// Runs every seed in the configured range to completion, each on its
    /// own blocking-pool task so the deterministic, CPU-bound kernel loop
    /// never blocks the async runtime (`spec.md` §4.8, §8 — one kernel, one
    /// store, one log per run, never shared across runs or threads).
    pub async fn run_batch(&self) -> Result<(Vec<SimulationResult>, ChaosMatrixStats), ChaosError> {
        if self.blueprint.scenario(&self.config.scenario_name).is_none() {
            return Err(ChaosError::UnknownScenario(self.config.scenario_name.clone()));
        }

        let start = Instant::now();
        let seeds = (0..self.config.seed_count).map(|i| self.config.seed_start + i);

        let tasks = seeds.map(|seed| {
            let blueprint = self.blueprint.clone();
            let config = self.config.clone();
            let coverage = self.coverage.clone();
            tokio::task::spawn_blocking(move || run_single_simulation(blueprint, seed, &config, coverage.as_deref()))
        });

        let joined = join_all(tasks).await;
        let mut results = Vec::with_capacity(joined.len());
        for outcome in joined {
            match outcome {
                Ok(result) => results.push(result),
                Err(join_error) => warn!(error = %join_error, "a chaos run's worker task panicked"),
            }
        }

        let total_time = start.elapsed();
        let stats = self.calculate_stats(&results, total_time);
        Ok((results, stats))
    }

    /// Groups the seeds of a batch by their final-state fingerprint,
    /// surfacing seeds that reach genuinely different outcomes from the same
    /// scenario — a signal of non-deterministic or racy handler logic
    /// (`spec.md` §4.8 "divergent state detection").
    pub async fn find_divergent_states(&self) -> Result<HashMap<String, Vec<u64>>, ChaosError> {
        let (results, _) = self.run_batch().await?;
        let mut grouped: HashMap<String, Vec<u64>> = HashMap::new();
        for result in results {
            if result.success {
                if let Some(fingerprint) = result.state_fingerprint {
                    grouped.entry(fingerprint).or_default().push(result.seed);
                }
            }
        }
        Ok(grouped)
    }

    fn calculate_stats(&self, results: &[SimulationResult], total_time: Duration) -> ChaosMatrixStats {
        let total_runs = results.len() as u64;
        let completed = results.iter().filter(|r| r.success).count() as u64;
        let failed = total_runs - completed;
        let success_rate = if total_runs == 0 {
            0.0
        } else {
            completed as f64 / total_runs as f64 * 100.0
        };

        let successful_times: Vec<Duration> = results.iter().filter(|r| r.success).map(|r| r.execution_time).collect();
        let avg_execution_time = if successful_times.is_empty() {
            Duration::ZERO
        } else {
            successful_times.iter().sum::<Duration>() / successful_times.len() as u32
        };
        let min_execution_time = successful_times.iter().min().copied().unwrap_or(Duration::ZERO);
        let max_execution_time = successful_times.iter().max().copied().unwrap_or(Duration::ZERO);

        let failing_seeds: Vec<u64> = results.iter().filter(|r| !r.success).map(|r| r.seed).collect();

        let failure_messages: Vec<String> = results
            .iter()
            .filter_map(|r| r.error_message.as_deref())
            .map(|message| message.lines().next().unwrap_or(message).to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let reliability = self.coverage.as_ref().map(|tracker| {
            let stats = tracker.get_coverage_stats();
            compute_score(stats.unique_states, stats.total_observations, total_runs)
        });

        info!(total_runs, completed, failed, "chaos batch finished");

        ChaosMatrixStats {
            total_runs,
            completed,
            failed,
            success_rate,
            total_execution_time: total_time,
            avg_execution_time,
            min_execution_time,
            max_execution_time,
            failing_seeds,
            unique_failure_patterns: failure_messages.len(),
            failure_messages,
            reliability,
        }
    }
}

/// Runs exactly one simulation: deep-copies the blueprint, fuzzes its target
/// scenario, builds a fresh [`Kernel`], drives it to completion, and
/// validates the result.
fn run_single_simulation(
    blueprint: Arc<Blueprint>,
    seed: u64,
    config: &ChaosConfig,
    coverage: Option<&CoverageTracker>,
) -> SimulationResult {
    let start = Instant::now();
    let fuzzed = Arc::new(apply_fuzzing(&blueprint, seed, &config.scenario_name, &config.fuzzing));

    let outcome = run_and_validate(&fuzzed, seed, &config.scenario_name, coverage);
    cleanup_with_retry(seed);
    let execution_time = start.elapsed();

    match outcome {
        Ok(mut result) => {
            result.execution_time = execution_time;
            result
        }
        Err(error_message) => SimulationResult {
            seed,
            success: false,
            event_count: 0,
            execution_time,
            error_message: Some(error_message),
            state_fingerprint: None,
        },
    }
}

fn run_and_validate(
    blueprint: &Arc<Blueprint>,
    seed: u64,
    scenario_name: &str,
    coverage: Option<&CoverageTracker>,
) -> Result<SimulationResult, String> {
    let kernel = Kernel::new(blueprint.clone(), seed).map_err(|e| e.to_string())?;
    let report = kernel.run(scenario_name).map_err(|e| e.to_string())?;

    let state_fingerprint = coverage.map(|tracker| {
        let fingerprint = compute_state_fingerprint(&report.final_state);
        tracker.add_state(fingerprint.clone());
        fingerprint
    });

    let event_count = report.events.len() as u64;
    let error_message = validate_run(blueprint, &report);

    Ok(SimulationResult {
        seed,
        success: error_message.is_none(),
        event_count,
        execution_time: Duration::ZERO, // overwritten by the caller once total elapsed time is known
        error_message,
        state_fingerprint,
    })
}

/// Honors `config.seed`, if set, as the base for this run's fuzzer seeds;
/// otherwise derives from the run's own seed (`spec.md` §4.6, §4.8 — "each
/// worker creates its own fuzzer instances with derived seeds", never a
/// shared one across concurrent runs).
fn fuzzer_base_seed(config: &FuzzingConfig, run_seed: u64) -> u64 {
    config.seed.unwrap_or(run_seed)
}

/// Deep-copies `blueprint` and fuzzes the target scenario's initial state
/// and message payloads in place, leaving every other scenario and all
/// handler logic untouched.
fn apply_fuzzing(blueprint: &Blueprint, seed: u64, scenario_name: &str, config: &FuzzingConfig) -> Blueprint {
    let mut fuzzed = blueprint.clone();
    let Some(index) = fuzzed.scenarios.iter().position(|s| s.name == scenario_name) else {
        return fuzzed;
    };

    if config.fuzz_states {
        let mut state_fuzzer = StateFuzzer::from_run_seed(fuzzer_base_seed(config, seed));
        fuzzed.scenarios[index].initial_state =
            state_fuzzer.fuzz_initial_state(&fuzzed.scenarios[index].initial_state, config);
    }

    if config.fuzz_inputs {
        let mut input_fuzzer = InputFuzzer::from_run_seed(fuzzer_base_seed(config, seed));
        for send in &mut fuzzed.scenarios[index].sends {
            send.payload = input_fuzzer.fuzz_payload(&send.payload, config);
        }
    }

    fuzzed
}

/// Retries a per-run cleanup step up to three times. The in-memory store has
/// nothing external to release, so this always succeeds on the first try;
/// the retry shape is kept so an on-disk backend can slot in without
/// reshaping the batch driver's control flow.
fn cleanup_with_retry(seed: u64) {
    const MAX_ATTEMPTS: u32 = 3;
    for attempt in 1..=MAX_ATTEMPTS {
        if release_run_resources(seed) {
            return;
        }
        tracing::debug!(seed, attempt, "cleanup attempt failed, retrying");
    }
    tracing::warn!(seed, "cleanup did not succeed after {MAX_ATTEMPTS} attempts");
}

fn release_run_resources(_seed: u64) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::{
        Component, ExternalSend, Handler, InitialStateEntry, RunConfig, Scenario, Step, TableSchema, TestInvariant,
    };

    fn row(pairs: &[(&str, weave_types::Value)]) -> weave_types::Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn counter_blueprint() -> Blueprint {
        Blueprint {
            components: vec![Component {
                name: "Counter".into(),
                tables: vec![TableSchema { name: "count".into(), columns: vec![] }],
                handlers: vec![Handler {
                    on_message: "Bump".into(),
                    logic: vec![Step::Create {
                        table: "count".into(),
                        data: row(&[("id", weave_types::Value::Str("only".into())), ("v", weave_types::Value::Int(1))]),
                    }],
                }],
                invariants: vec![],
                message_schemas: vec![],
            }],
            scenarios: vec![Scenario {
                name: "bump_once".into(),
                initial_state: vec![],
                sends: vec![ExternalSend {
                    to: "Counter".into(),
                    message: "Bump".into(),
                    payload: weave_types::Row::new(),
                }],
            }],
            test_invariants: vec![],
            run: RunConfig::default(),
        }
    }

    #[tokio::test]
    async fn batch_of_passing_runs_all_succeed() {
        let matrix = ChaosMatrix::new(Arc::new(counter_blueprint()), ChaosConfig::new("bump_once", 1, 5));
        let (results, stats) = matrix.run_batch().await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(stats.total_runs, 5);
        assert_eq!(stats.completed, 5);
        assert_eq!(stats.failed, 0);
        assert!(stats.reliability.is_some());
    }

    #[tokio::test]
    async fn unknown_scenario_is_rejected() {
        let matrix = ChaosMatrix::new(Arc::new(counter_blueprint()), ChaosConfig::new("missing", 1, 1));
        assert!(matches!(matrix.run_batch().await, Err(ChaosError::UnknownScenario(_))));
    }

    #[tokio::test]
    async fn explicit_final_state_invariant_is_checked() {
        let mut bp = counter_blueprint();
        bp.test_invariants.push(TestInvariant::FinalState {
            expression: "sum(root.Counter.count.v) == 1".into(),
        });
        let matrix = ChaosMatrix::new(Arc::new(bp), ChaosConfig::new("bump_once", 1, 3));
        let (results, stats) = matrix.run_batch().await.unwrap();
        assert_eq!(stats.completed, 3);
        assert!(results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn explicit_final_state_invariant_catches_violation() {
        let mut bp = counter_blueprint();
        bp.test_invariants.push(TestInvariant::FinalState {
            expression: "sum(root.Counter.count.v) == 99".into(),
        });
        let matrix = ChaosMatrix::new(Arc::new(bp), ChaosConfig::new("bump_once", 1, 2));
        let (results, stats) = matrix.run_batch().await.unwrap();
        assert_eq!(stats.failed, 2);
        assert!(results.iter().all(|r| !r.success));
        assert_eq!(stats.unique_failure_patterns, 1);
    }

    #[tokio::test]
    async fn builtin_balance_conservation_fallback_catches_violation() {
        let mut bp = counter_blueprint();
        bp.components.push(Component {
            name: "Bank".into(),
            tables: vec![TableSchema { name: "account".into(), columns: vec![] }],
            handlers: vec![Handler {
                on_message: "Leak".into(),
                logic: vec![Step::Update {
                    table: "account".into(),
                    set: row(&[("balance", weave_types::Value::Int(50))]),
                    where_: row(&[("id", weave_types::Value::Str("a".into()))]),
                }],
            }],
            invariants: vec![],
            message_schemas: vec![],
        });
        bp.scenarios.push(Scenario {
            name: "leak_money".into(),
            initial_state: vec![InitialStateEntry {
                component: "Bank".into(),
                table: "account".into(),
                rows: vec![row(&[("id", weave_types::Value::Str("a".into())), ("balance", weave_types::Value::Int(100))])],
            }],
            sends: vec![ExternalSend {
                to: "Bank".into(),
                message: "Leak".into(),
                payload: weave_types::Row::new(),
            }],
        });

        let matrix = ChaosMatrix::new(Arc::new(bp), ChaosConfig::new("leak_money", 1, 2));
        let (results, stats) = matrix.run_batch().await.unwrap();
        assert_eq!(stats.failed, 2);
        assert!(results.iter().all(|r| r.error_message.as_deref().unwrap().contains("balance")));
    }

    #[tokio::test]
    async fn find_divergent_states_groups_by_fingerprint() {
        let matrix = ChaosMatrix::new(Arc::new(counter_blueprint()), ChaosConfig::new("bump_once", 1, 4));
        let grouped = matrix.find_divergent_states().await.unwrap();
        let total: usize = grouped.values().map(|seeds| seeds.len()).sum();
        assert_eq!(total, 4);
    }
}
