//! Kernel construction and run errors.

use thiserror::Error;

/// Failure modes a kernel can surface. Note that an `INVARIANT_FAIL`
/// observed mid-run is *not* one of these — it is reported through
/// [`crate::RunOutcome::InvariantFailed`] alongside the (still valid) event
/// log produced up to that point, matching the original's "log, commit,
/// then halt" behaviour rather than discarding the run's history.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The blueprint failed static analysis (`spec.md` §4.2); no kernel can
    /// be constructed from it.
    #[error("blueprint failed static analysis: {0}")]
    Analysis(#[from] weave_analyzer::AnalysisReport),
    /// `run` was called with a scenario name the blueprint does not define.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
}
