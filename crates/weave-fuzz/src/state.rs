//! Initial-state fuzzing (`spec.md` §4.6).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use weave_types::{InitialStateEntry, Row, Value};

use crate::config::FuzzingConfig;

/// Mutates scenario initial-state entries before they are seeded into the
/// store. Private RNG, derived `run_seed + 2` by convention (`spec.md`
/// §4.6).
pub struct StateFuzzer {
    rng: StdRng,
}

impl StateFuzzer {
    /// Creates a fuzzer seeded explicitly.
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Creates a fuzzer whose seed is derived from a chaos run's seed
    /// (`run_seed + 2`).
    pub fn from_run_seed(run_seed: u64) -> Self {
        Self::new(run_seed.wrapping_add(2))
    }

    /// Fuzzes every initial-state entry independently.
    pub fn fuzz_initial_state(&mut self, entries: &[InitialStateEntry], config: &FuzzingConfig) -> Vec<InitialStateEntry> {
        entries.iter().map(|entry| self.fuzz_entry(entry, config)).collect()
    }

    fn fuzz_entry(&mut self, entry: &InitialStateEntry, config: &FuzzingConfig) -> InitialStateEntry {
        let rows = if self.rng.gen_bool(0.2) {
            Vec::new()
        } else if self.rng.gen_bool(0.2) {
            let copies = self.rng.gen_range(10..=100);
            let mut duplicated = Vec::with_capacity(entry.rows.len() * copies);
            for _ in 0..copies {
                for row in &entry.rows {
                    duplicated.push(self.fuzz_record(row, config));
                }
            }
            duplicated
        } else {
            entry.rows.iter().map(|row| self.fuzz_record(row, config)).collect()
        };
        InitialStateEntry {
            component: entry.component.clone(),
            table: entry.table.clone(),
            rows,
        }
    }

    /// Fuzzes one row, skipping any column whose name contains `"id"`
    /// (case-insensitively) so primary/foreign keys stay intact and the
    /// fuzzed state remains referentially coherent.
    fn fuzz_record(&mut self, row: &Row, config: &FuzzingConfig) -> Row {
        row.iter()
            .map(|(column, value)| {
                if column.to_lowercase().contains("id") {
                    return (column.clone(), value.clone());
                }
                let fuzzed = match value {
                    Value::Int(i) => self.fuzz_numeric_field(*i as f64, true, config),
                    Value::Float(f) => self.fuzz_numeric_field(*f, false, config),
                    Value::Str(s) => self.fuzz_string_field(s),
                    other => other.clone(),
                };
                (column.clone(), fuzzed)
            })
            .collect()
    }

    fn fuzz_numeric_field(&mut self, value: f64, is_int: bool, config: &FuzzingConfig) -> Value {
        let result = if self.rng.gen_bool(config.boundary_value_prob) {
            *[0.0, -1.0, 1.0, 1_000_000.0]
                .get(self.rng.gen_range(0..4))
                .expect("fixed-size boundary slice")
        } else {
            value * self.rng.gen_range(0.1..10.0)
        };
        if is_int {
            Value::Int(result as i64)
        } else {
            Value::Float(result)
        }
    }

    fn fuzz_string_field(&mut self, value: &str) -> Value {
        if self.rng.gen_bool(0.1) {
            return Value::Str(String::new());
        }
        if self.rng.gen_bool(0.1) {
            let len = self.rng.gen_range(5..=15);
            let s: String = (0..len).map(|_| (b'a' + self.rng.gen_range(0..26)) as char).collect();
            return Value::Str(s);
        }
        Value::Str(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn id_columns_are_never_fuzzed() {
        let mut fuzzer = StateFuzzer::new(1);
        let config = FuzzingConfig::default();
        let original = row(&[("account_id", Value::Str("acct-1".into())), ("balance", Value::Int(100))]);
        for _ in 0..20 {
            let fuzzed = fuzzer.fuzz_record(&original, &config);
            assert_eq!(fuzzed.get("account_id"), original.get("account_id"));
        }
    }

    #[test]
    fn same_seed_is_deterministic() {
        let config = FuzzingConfig::default();
        let entries = vec![InitialStateEntry {
            component: "A".into(),
            table: "t".into(),
            rows: vec![row(&[("id", Value::Str("x".into())), ("v", Value::Int(5))])],
        }];
        let mut a = StateFuzzer::new(9);
        let mut b = StateFuzzer::new(9);
        assert_eq!(a.fuzz_initial_state(&entries, &config), b.fuzz_initial_state(&entries, &config));
    }

    #[test]
    fn from_run_seed_offsets_by_two() {
        let a = StateFuzzer::from_run_seed(100);
        let b = StateFuzzer::new(102);
        assert_eq!(a.rng.clone().gen::<u64>(), b.rng.clone().gen::<u64>());
    }
}
