//! Chaos batch configuration (`spec.md` §4.8).

use weave_fuzz::FuzzingConfig;

/// Configuration for one chaos batch run: which scenario, which seeds, and
/// how aggressively to mutate inputs along the way.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Scenario executed on every seed.
    pub scenario_name: String,
    /// First seed in the contiguous range `[seed_start, seed_start + seed_count)`.
    pub seed_start: u64,
    /// How many seeds to run.
    pub seed_count: u64,
    /// Mutation knobs applied to every run via `weave-fuzz`.
    pub fuzzing: FuzzingConfig,
    /// Whether to accumulate state fingerprints into a shared coverage
    /// tracker and compute a reliability score over the batch.
    pub track_coverage: bool,
}

impl ChaosConfig {
    /// A plain replay batch: fuzzing off, coverage tracking on, matching the
    /// default most callers want when hunting a specific seed range rather
    /// than exploring input space.
    pub fn new(scenario_name: impl Into<String>, seed_start: u64, seed_count: u64) -> Self {
        Self {
            scenario_name: scenario_name.into(),
            seed_start,
            seed_count,
            fuzzing: FuzzingConfig {
                fuzz_inputs: false,
                fuzz_states: false,
                fuzz_scenarios: false,
                ..FuzzingConfig::default()
            },
            track_coverage: true,
        }
    }

    /// Same as [`ChaosConfig::new`] but with `weave-fuzz`'s default fuzzing
    /// knobs turned on, for an actual chaos-exploration batch.
    pub fn with_fuzzing(mut self, fuzzing: FuzzingConfig) -> Self {
        self.fuzzing = fuzzing;
        self
    }
}
