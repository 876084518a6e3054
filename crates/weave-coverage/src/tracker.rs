//! Coverage tracking across a batch of chaos runs (`spec.md` §4.7).

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;

/// Snapshot of a tracker's accumulated coverage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageStats {
    /// Distinct state fingerprints observed.
    pub unique_states: u64,
    /// Total state observations recorded, including repeats.
    pub total_observations: u64,
    /// `unique_states / total_observations`, or `0.0` if nothing has been
    /// observed yet.
    pub coverage_rate: f64,
}

/// Thread-safe accumulator of distinct state fingerprints observed across
/// a chaos batch. Backed by [`DashSet`] so concurrent runs can record
/// observations without an external lock (`spec.md` §4.8 — the batch
/// driver merges per-run coverage into one tracker from many worker
/// tasks).
#[derive(Debug, Default)]
pub struct CoverageTracker {
    fingerprints: DashSet<String>,
    observations: AtomicU64,
}

impl CoverageTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation of `fingerprint`. Returns `true` if this is
    /// the first time this fingerprint has been seen.
    pub fn add_state(&self, fingerprint: String) -> bool {
        self.observations.fetch_add(1, Ordering::Relaxed);
        self.fingerprints.insert(fingerprint)
    }

    /// Current coverage statistics.
    pub fn get_coverage_stats(&self) -> CoverageStats {
        let unique_states = self.fingerprints.len() as u64;
        let total_observations = self.observations.load(Ordering::Relaxed);
        let coverage_rate = if total_observations == 0 {
            0.0
        } else {
            unique_states as f64 / total_observations as f64
        };
        CoverageStats { unique_states, total_observations, coverage_rate }
    }

    /// Estimates the total reachable state space via Heaps' Law, or `None`
    /// if fewer than 100 observations have been recorded (too little data
    /// to extrapolate from).
    pub fn estimate_total_states(&self) -> Option<u64> {
        estimate_total_states(self.fingerprints.len() as u64, self.observations.load(Ordering::Relaxed))
    }

    /// Clears all recorded state.
    pub fn reset(&self) {
        self.fingerprints.clear();
        self.observations.store(0, Ordering::Relaxed);
    }

    /// Merges `other`'s fingerprints and observation count into `self`.
    pub fn merge(&self, other: &CoverageTracker) {
        for fingerprint in other.fingerprints.iter() {
            self.fingerprints.insert(fingerprint.clone());
        }
        self.observations.fetch_add(other.observations.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

/// Heaps' Law extrapolation of total reachable states from `unique`
/// distinct states observed over `total_observations` samples
/// (`beta = 0.5`, matching the original tuning). Returns `None` below 100
/// observations, and never returns less than `unique` (we have already
/// observed that many, so the estimate cannot be lower).
pub(crate) fn estimate_total_states(unique: u64, total_observations: u64) -> Option<u64> {
    if total_observations < 100 {
        return None;
    }
    const BETA: f64 = 0.5;
    let k = unique as f64 / (total_observations as f64).powf(BETA);
    let estimated = (k * (total_observations as f64 * 10.0).powf(BETA)) as u64;
    Some(estimated.max(unique))
}
