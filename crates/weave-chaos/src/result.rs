//! Per-run and aggregate batch results (`spec.md` §4.8).

use std::time::Duration;

use weave_coverage::ReliabilityScore;

/// Outcome of one simulation run within a chaos batch.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Seed this run used.
    pub seed: u64,
    /// Whether the run completed without tripping any invariant.
    pub success: bool,
    /// Total events the run recorded.
    pub event_count: u64,
    /// Wall-clock duration of the run.
    pub execution_time: Duration,
    /// First line of the failure reason, if any.
    pub error_message: Option<String>,
    /// SHA-256 fingerprint of the run's final state, present whenever the
    /// batch's [`crate::ChaosConfig::track_coverage`] is on.
    pub state_fingerprint: Option<String>,
}

/// Aggregated statistics over a completed chaos batch.
#[derive(Debug, Clone)]
pub struct ChaosMatrixStats {
    /// Total seeds run.
    pub total_runs: u64,
    /// Runs that completed without a validation failure.
    pub completed: u64,
    /// Runs that failed validation.
    pub failed: u64,
    /// `completed / total_runs`, as a percentage.
    pub success_rate: f64,
    /// Wall-clock time for the whole batch.
    pub total_execution_time: Duration,
    /// Mean duration of successful runs.
    pub avg_execution_time: Duration,
    /// Shortest successful run.
    pub min_execution_time: Duration,
    /// Longest successful run.
    pub max_execution_time: Duration,
    /// Seeds that failed, for replay.
    pub failing_seeds: Vec<u64>,
    /// Count of distinct first-line failure messages.
    pub unique_failure_patterns: usize,
    /// The distinct first-line failure messages themselves.
    pub failure_messages: Vec<String>,
    /// Reliability assessment over the batch's accumulated state coverage,
    /// present whenever coverage tracking is on.
    pub reliability: Option<ReliabilityScore>,
}
