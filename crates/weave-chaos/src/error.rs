//! Chaos-batch error type.

use thiserror::Error;

/// Failure modes from constructing or driving a [`crate::ChaosMatrix`].
#[derive(Debug, Error)]
pub enum ChaosError {
    /// The configured scenario name has no matching scenario in the
    /// blueprint.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
}
