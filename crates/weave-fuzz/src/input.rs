//! Message payload fuzzing (`spec.md` §4.6).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use weave_types::{Row, Value, MAX_STRING_LEN};

use crate::config::{FuzzingConfig, BOUNDARY_FLOATS, BOUNDARY_INTS, BOUNDARY_STRINGS};

/// Mutates message payloads before dispatch. Holds a private RNG so
/// concurrent chaos runs never contend on or desynchronize shared random
/// state (`spec.md` §4.6, §8).
pub struct InputFuzzer {
    rng: StdRng,
}

impl InputFuzzer {
    /// Creates a fuzzer seeded explicitly.
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Creates a fuzzer whose seed is derived from a chaos run's seed
    /// (`run_seed + 1`), used when `config.seed` is unset.
    pub fn from_run_seed(run_seed: u64) -> Self {
        Self::new(run_seed.wrapping_add(1))
    }

    /// Fuzzes `payload` in place: each field has an independent 50% chance
    /// of being mutated.
    pub fn fuzz_payload(&mut self, payload: &Row, config: &FuzzingConfig) -> Row {
        payload
            .iter()
            .map(|(key, value)| {
                let fuzzed = if self.rng.gen_bool(0.5) {
                    self.fuzz_value(value, config)
                } else {
                    value.clone()
                };
                (key.clone(), fuzzed)
            })
            .collect()
    }

    fn fuzz_value(&mut self, value: &Value, config: &FuzzingConfig) -> Value {
        if self.rng.gen_bool(config.null_prob) {
            return Value::Null;
        }
        match value {
            Value::Bool(b) => self.fuzz_boolean(*b, config),
            Value::Int(i) => self.fuzz_integer(*i, config),
            Value::Float(f) => self.fuzz_float(*f, config),
            Value::Str(s) => self.fuzz_string(s, config),
            Value::List(items) => self.fuzz_list(items, config),
            other => other.clone(),
        }
    }

    fn fuzz_integer(&mut self, value: i64, config: &FuzzingConfig) -> Value {
        if self.rng.gen_bool(config.boundary_value_prob) {
            let idx = self.rng.gen_range(0..BOUNDARY_INTS.len());
            return Value::Int(BOUNDARY_INTS[idx]);
        }
        if self.rng.gen_bool(config.type_confusion_prob) {
            return Value::Str(value.to_string());
        }
        if self.rng.gen_bool(config.extreme_value_prob) {
            return Value::Int(match self.rng.gen_range(0..3) {
                0 => value.saturating_mul(1_000_000),
                1 => value.saturating_neg(),
                _ => value.saturating_abs(),
            });
        }
        Value::Int(value.saturating_add(self.rng.gen_range(-10..=10)))
    }

    fn fuzz_float(&mut self, value: f64, config: &FuzzingConfig) -> Value {
        if self.rng.gen_bool(config.boundary_value_prob) {
            let idx = self.rng.gen_range(0..BOUNDARY_FLOATS.len());
            return Value::Float(BOUNDARY_FLOATS[idx]);
        }
        if self.rng.gen_bool(config.type_confusion_prob) {
            return Value::Int(value as i64);
        }
        if self.rng.gen_bool(config.extreme_value_prob) {
            return Value::Float(value * 1_000_000.0);
        }
        Value::Float(value * self.rng.gen_range(0.5..2.0))
    }

    fn fuzz_string(&mut self, value: &str, config: &FuzzingConfig) -> Value {
        if self.rng.gen_bool(config.boundary_value_prob) {
            let idx = self.rng.gen_range(0..BOUNDARY_STRINGS.len());
            return Value::Str(BOUNDARY_STRINGS[idx].to_string());
        }
        if self.rng.gen_bool(config.type_confusion_prob) {
            if let Ok(parsed) = value.trim().parse::<i64>() {
                return Value::Int(parsed);
            }
            return Value::Str(value.to_string());
        }
        if self.rng.gen_bool(config.extreme_value_prob) {
            let repeated = value.repeat(100);
            let truncated: String = repeated.chars().take(MAX_STRING_LEN).collect();
            return Value::Str(truncated);
        }
        if value.is_empty() {
            return Value::Str(value.to_string());
        }
        let mut chars: Vec<char> = value.chars().collect();
        let idx = self.rng.gen_range(0..chars.len());
        chars[idx] = (b'a' + self.rng.gen_range(0..26)) as char;
        Value::Str(chars.into_iter().collect())
    }

    fn fuzz_boolean(&mut self, value: bool, config: &FuzzingConfig) -> Value {
        if self.rng.gen_bool(config.type_confusion_prob) {
            return if self.rng.gen_bool(0.5) {
                Value::Int(if value { 1 } else { 0 })
            } else {
                Value::Str(value.to_string())
            };
        }
        Value::Bool(!value)
    }

    fn fuzz_list(&mut self, items: &[Value], config: &FuzzingConfig) -> Value {
        if self.rng.gen_bool(config.boundary_value_prob) {
            return Value::List(Vec::new());
        }
        if self.rng.gen_bool(config.extreme_value_prob) {
            let mut expanded = Vec::with_capacity(items.len() * 100);
            for _ in 0..100 {
                expanded.extend(items.iter().cloned());
            }
            return Value::List(expanded);
        }
        Value::List(items.iter().map(|item| self.fuzz_value(item, config)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_is_deterministic() {
        let config = FuzzingConfig::default();
        let payload: Row = [("v".to_string(), Value::Int(42))].into_iter().collect();
        let mut a = InputFuzzer::new(7);
        let mut b = InputFuzzer::new(7);
        assert_eq!(a.fuzz_payload(&payload, &config), b.fuzz_payload(&payload, &config));
    }

    #[test]
    fn from_run_seed_offsets_by_one() {
        let a = InputFuzzer::from_run_seed(100);
        let b = InputFuzzer::new(101);
        assert_eq!(a.rng.clone().gen::<u64>(), b.rng.clone().gen::<u64>());
    }

    #[test]
    fn boundary_prob_one_always_produces_a_boundary_int() {
        let mut config = FuzzingConfig::default();
        config.boundary_value_prob = 1.0;
        config.null_prob = 0.0;
        let mut fuzzer = InputFuzzer::new(1);
        let fuzzed = fuzzer.fuzz_integer(123, &config);
        assert!(matches!(fuzzed, Value::Int(i) if BOUNDARY_INTS.contains(&i)));
    }

    #[test]
    fn null_prob_one_always_nulls() {
        let mut config = FuzzingConfig::default();
        config.null_prob = 1.0;
        let mut fuzzer = InputFuzzer::new(1);
        assert_eq!(fuzzer.fuzz_value(&Value::Int(5), &config), Value::Null);
    }

    #[test]
    fn extreme_string_is_bounded_by_max_len() {
        let mut config = FuzzingConfig::default();
        config.boundary_value_prob = 0.0;
        config.type_confusion_prob = 0.0;
        config.extreme_value_prob = 1.0;
        config.null_prob = 0.0;
        let mut fuzzer = InputFuzzer::new(1);
        let long = "x".repeat(MAX_STRING_LEN);
        let fuzzed = fuzzer.fuzz_string(&long, &config);
        if let Value::Str(s) = fuzzed {
            assert!(s.chars().count() <= MAX_STRING_LEN);
        } else {
            panic!("expected a string");
        }
    }
}
