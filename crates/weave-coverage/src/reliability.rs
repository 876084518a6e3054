//! Reliability scoring (`spec.md` §4.7).

use crate::tracker::estimate_total_states;

const WILSON_Z: f64 = 1.96;

/// A point-in-time reliability assessment for a chaos batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReliabilityScore {
    /// Composite score in `[0, 100]`.
    pub score: f64,
    /// Lower bound of the 95% Wilson confidence interval on coverage rate,
    /// expressed as a percentage.
    pub confidence_lower: f64,
    /// Upper bound of the 95% Wilson confidence interval, as a percentage.
    pub confidence_upper: f64,
    /// Distinct states observed.
    pub unique_states: u64,
    /// Total state observations.
    pub total_observations: u64,
    /// Heaps'-Law estimate of the total reachable state space, if enough
    /// observations have accumulated.
    pub estimated_total_states: Option<u64>,
}

/// Computes a [`ReliabilityScore`] from accumulated coverage plus the
/// number of simulations run. All-zero if nothing has been observed.
pub fn compute_score(unique_states: u64, total_observations: u64, num_simulations: u64) -> ReliabilityScore {
    if unique_states == 0 || total_observations == 0 {
        return ReliabilityScore {
            score: 0.0,
            confidence_lower: 0.0,
            confidence_upper: 0.0,
            unique_states,
            total_observations,
            estimated_total_states: None,
        };
    }

    let coverage_rate = unique_states as f64 / total_observations as f64;
    let base_score = (coverage_rate * 100.0).min(100.0);
    let state_bonus = ((unique_states as f64 + 1.0).log10() * 10.0).min(30.0);
    let sim_bonus = ((num_simulations as f64 + 1.0).log10() * 5.0).min(15.0);
    let score = (base_score + state_bonus + sim_bonus).min(100.0);

    let n = total_observations as f64;
    let p = coverage_rate;
    let z2 = WILSON_Z * WILSON_Z;
    let denominator = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denominator;
    let margin = (WILSON_Z * ((p * (1.0 - p) / n) + z2 / (4.0 * n * n)).sqrt()) / denominator;
    let confidence_lower = (center - margin).max(0.0) * 100.0;
    let confidence_upper = (center + margin).min(1.0) * 100.0;

    ReliabilityScore {
        score,
        confidence_lower,
        confidence_upper,
        unique_states,
        total_observations,
        estimated_total_states: estimate_total_states(unique_states, total_observations),
    }
}

/// Buckets a score into a human-readable label, matching the thresholds
/// used in chaos batch reports.
pub fn interpret_score(score: f64) -> &'static str {
    if score >= 95.0 {
        "excellent"
    } else if score >= 85.0 {
        "good"
    } else if score >= 70.0 {
        "fair"
    } else if score >= 50.0 {
        "poor"
    } else {
        "insufficient"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_observations_yields_zero_score() {
        let score = compute_score(0, 0, 0);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.estimated_total_states, None);
    }

    #[test]
    fn full_coverage_single_state_scores_low_on_state_bonus() {
        let score = compute_score(1, 50, 50);
        assert!(score.score <= 100.0);
        assert!(score.confidence_lower <= score.confidence_upper);
    }

    #[test]
    fn more_unique_states_never_decreases_score_holding_rate_fixed() {
        let low = compute_score(10, 100, 100);
        let high = compute_score(50, 100, 100);
        assert!(high.score >= low.score);
    }

    #[test]
    fn interpret_score_buckets_correctly() {
        assert_eq!(interpret_score(99.0), "excellent");
        assert_eq!(interpret_score(90.0), "good");
        assert_eq!(interpret_score(75.0), "fair");
        assert_eq!(interpret_score(60.0), "poor");
        assert_eq!(interpret_score(10.0), "insufficient");
    }
}
