#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-chaos** – parallel chaos batch driver (C8).
//!
//! [`ChaosMatrix`] runs one scenario under many seeds, each on its own
//! isolated [`weave_kernel::Kernel`] with its own fuzzed blueprint copy, and
//! aggregates the results into a [`ChaosMatrixStats`] report backed by
//! `weave-coverage`'s fingerprinting and reliability scoring (`spec.md`
//! §4.8).

mod config;
mod error;
mod matrix;
mod result;
mod validate;
mod view;

pub use config::ChaosConfig;
pub use error::ChaosError;
pub use matrix::ChaosMatrix;
pub use result::{ChaosMatrixStats, SimulationResult};
