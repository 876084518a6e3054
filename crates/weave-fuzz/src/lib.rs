#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-fuzz** – input, state, and scenario fuzzers (C6).
//!
//! Three independent fuzzers, each with its own private RNG derived from a
//! chaos run's seed (`spec.md` §4.6, §8): [`InputFuzzer`] mutates message
//! payloads before dispatch, [`StateFuzzer`] mutates scenario initial state
//! before seeding, and [`ScenarioFuzzer`] chains multiple scenarios
//! together. None of them touch a shared or thread-local RNG — sharing one
//! across concurrent chaos runs would make each run's mutations depend on
//! scheduling order, destroying replay determinism.

mod config;
mod input;
mod scenario;
mod state;

pub use config::FuzzingConfig;
pub use input::InputFuzzer;
pub use scenario::{ChainMode, ScenarioFuzzer};
pub use state::StateFuzzer;
