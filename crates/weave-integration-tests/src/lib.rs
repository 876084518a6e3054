//! Cross-crate end-to-end tests (`spec.md` §8 "Concrete end-to-end
//! scenarios"). No public API: every scenario lives under `tests/`.
