//! Deterministic identifier generation.
//!
//! `spec.md` §3: event/correlation/causation ids are a short prefix plus a
//! fixed-width lowercase-hex integer drawn from the run's own RNG — never a
//! real UUID. Real UUIDs are reserved for the expression engine's `uuid()`
//! builtin, which draws from the process RNG, not the run's.

use rand::Rng;

/// Draws one `u64` from `rng` and formats it as `{prefix}_{hex:016}`.
pub(crate) fn generate_id<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> String {
    let bits: u64 = rng.gen();
    format!("{prefix}_{bits:016x}")
}
