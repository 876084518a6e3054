//! Fuzzing knobs shared by every fuzzer in this crate.

use serde::{Deserialize, Serialize};

/// Probabilities and toggles controlling how aggressively a chaos run
/// mutates inputs, initial state, and scenario chaining (`spec.md` §4.6).
/// Serializable so a blueprint's `run` section (or a standalone chaos
/// config file) can override the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzingConfig {
    /// Mutate message payloads before dispatch.
    pub fuzz_inputs: bool,
    /// Mutate scenario initial state before seeding.
    pub fuzz_states: bool,
    /// Chain multiple scenarios together before running.
    pub fuzz_scenarios: bool,
    /// Chance a fuzzed scalar is replaced by one of the pinned boundary
    /// values for its type.
    pub boundary_value_prob: f64,
    /// Chance a fuzzed scalar is replaced by a value of a different,
    /// plausible-but-wrong type.
    pub type_confusion_prob: f64,
    /// Chance any fuzzed field is replaced outright with `null`.
    pub null_prob: f64,
    /// Chance a fuzzed scalar is scaled to an extreme magnitude instead of
    /// perturbed gently.
    pub extreme_value_prob: f64,
    /// Explicit seed for this fuzzer; `None` derives one from the run seed
    /// (`spec.md` §4.6 — each fuzzer gets its own private RNG).
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for FuzzingConfig {
    fn default() -> Self {
        Self {
            fuzz_inputs: true,
            fuzz_states: true,
            fuzz_scenarios: false,
            boundary_value_prob: 0.3,
            type_confusion_prob: 0.2,
            null_prob: 0.1,
            extreme_value_prob: 0.2,
            seed: None,
        }
    }
}

/// Pinned integer boundary values (`spec.md` §4.6).
pub(crate) const BOUNDARY_INTS: &[i64] = &[0, -1, 1, i32::MAX as i64, i32::MIN as i64, i64::MAX, i64::MIN];

/// Pinned float boundary values. `NaN` is deliberately excluded: it is not
/// equal to itself, which breaks state fingerprinting and final-state
/// equality assertions downstream.
pub(crate) const BOUNDARY_FLOATS: &[f64] = &[0.0, -0.0, f64::INFINITY, f64::NEG_INFINITY];

/// Pinned string boundary values.
pub(crate) const BOUNDARY_STRINGS: &[&str] = &["", " ", "\n\t", "NULL", "0", "true"];
