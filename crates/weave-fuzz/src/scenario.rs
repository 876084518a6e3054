//! Scenario chaining (`spec.md` §4.6 "scenario fuzzing" — off by default,
//! gated by [`crate::FuzzingConfig::fuzz_scenarios`]).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use weave_types::{ExternalSend, InitialStateEntry, Scenario};

/// How multiple scenarios' external sends are combined into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainMode {
    /// Concatenate each scenario's sends in order.
    Sequential,
    /// Concatenate, then shuffle the combined order.
    Parallel,
    /// Round-robin one send from each scenario in turn.
    Interleaved,
}

/// Combines independently-authored scenarios into one chained scenario,
/// for chaos runs that want to exercise cross-scenario interaction.
pub struct ScenarioFuzzer {
    rng: StdRng,
}

impl ScenarioFuzzer {
    /// Creates a fuzzer seeded explicitly.
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Creates a fuzzer whose seed is derived from a chaos run's seed
    /// (`run_seed + 3`, following the `+1`/`+2` convention of the input and
    /// state fuzzers).
    pub fn from_run_seed(run_seed: u64) -> Self {
        Self::new(run_seed.wrapping_add(3))
    }

    /// Chains `scenarios` under `mode` into one combined scenario named
    /// `name`. Initial-state entries are concatenated in input order
    /// regardless of mode; only the `sends` ordering differs by mode.
    pub fn chain_scenarios(&mut self, name: &str, scenarios: &[Scenario], mode: ChainMode) -> Scenario {
        let initial_state: Vec<InitialStateEntry> =
            scenarios.iter().flat_map(|s| s.initial_state.iter().cloned()).collect();

        let sends = match mode {
            ChainMode::Sequential => self.chain_sequential(scenarios),
            ChainMode::Parallel => self.chain_parallel(scenarios),
            ChainMode::Interleaved => self.chain_interleaved(scenarios),
        };

        Scenario { name: name.to_string(), initial_state, sends }
    }

    fn chain_sequential(&self, scenarios: &[Scenario]) -> Vec<ExternalSend> {
        scenarios.iter().flat_map(|s| s.sends.iter().cloned()).collect()
    }

    fn chain_parallel(&mut self, scenarios: &[Scenario]) -> Vec<ExternalSend> {
        let mut sends = self.chain_sequential(scenarios);
        sends.shuffle(&mut self.rng);
        sends
    }

    fn chain_interleaved(&self, scenarios: &[Scenario]) -> Vec<ExternalSend> {
        let max_len = scenarios.iter().map(|s| s.sends.len()).max().unwrap_or(0);
        let mut sends = Vec::new();
        for i in 0..max_len {
            for scenario in scenarios {
                if let Some(send) = scenario.sends.get(i) {
                    sends.push(send.clone());
                }
            }
        }
        sends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::Row;

    fn scenario(name: &str, messages: &[&str]) -> Scenario {
        Scenario {
            name: name.to_string(),
            initial_state: vec![],
            sends: messages
                .iter()
                .map(|m| ExternalSend { to: "A".into(), message: m.to_string(), payload: Row::new() })
                .collect(),
        }
    }

    #[test]
    fn sequential_concatenates_in_order() {
        let mut fuzzer = ScenarioFuzzer::new(1);
        let chained = fuzzer.chain_scenarios(
            "combined",
            &[scenario("s1", &["a", "b"]), scenario("s2", &["c"])],
            ChainMode::Sequential,
        );
        let names: Vec<_> = chained.sends.iter().map(|s| s.message.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn interleaved_round_robins() {
        let mut fuzzer = ScenarioFuzzer::new(1);
        let chained = fuzzer.chain_scenarios(
            "combined",
            &[scenario("s1", &["a", "b"]), scenario("s2", &["c"])],
            ChainMode::Interleaved,
        );
        let names: Vec<_> = chained.sends.iter().map(|s| s.message.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "b"]);
    }

    #[test]
    fn parallel_preserves_multiset() {
        let mut fuzzer = ScenarioFuzzer::new(1);
        let chained = fuzzer.chain_scenarios(
            "combined",
            &[scenario("s1", &["a", "b"]), scenario("s2", &["c"])],
            ChainMode::Parallel,
        );
        let mut names: Vec<_> = chained.sends.iter().map(|s| s.message.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
