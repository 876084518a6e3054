#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-coverage** – state fingerprinting, coverage tracking, and
//! reliability scoring for chaos batches (C7).
//!
//! [`compute_state_fingerprint`] reduces a full state snapshot to one
//! SHA-256 digest; [`CoverageTracker`] accumulates distinct fingerprints
//! across many runs; [`compute_score`] turns accumulated coverage into a
//! single reliability number with a Wilson confidence interval
//! (`spec.md` §4.7).

mod fingerprint;
mod reliability;
mod tracker;

pub use fingerprint::compute_state_fingerprint;
pub use reliability::{compute_score, interpret_score, ReliabilityScore};
pub use tracker::{CoverageStats, CoverageTracker};
