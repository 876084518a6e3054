//! Bounded LRU cache of parsed expressions, keyed by source string.
//!
//! Grounded on the teacher's use of `indexmap::IndexMap` for
//! insertion-ordered maps (`toka-orchestration`'s dependency graph):
//! `IndexMap` already gives us an ordered map with O(1) "move to the most
//! recently used end" via `shift_remove` + re-insert, so no extra crate is
//! needed beyond what the teacher's workspace already pulls in.

use std::sync::Mutex;

use indexmap::IndexMap;

use crate::ast::Expr;
use crate::parser::{self, ParseError};

/// Default capacity, matching `spec.md` §4.1's "recommended >= 4,096".
pub const DEFAULT_CAPACITY: usize = 4_096;

/// Thread-safe, capacity-bounded LRU cache mapping expression source text
/// to its parsed form (or to its parse error, so a malformed expression
/// does not re-tokenize on every evaluation either).
pub struct ParseCache {
    capacity: usize,
    entries: Mutex<IndexMap<String, Result<Expr, ParseError>>>,
}

impl ParseCache {
    /// Creates a cache with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Parses `source`, serving from cache when possible. Touches the
    /// entry to the most-recently-used position on every hit.
    pub fn parse(&self, source: &str) -> Result<Expr, ParseError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(result) = entries.shift_remove(source) {
            entries.insert(source.to_string(), result.clone());
            return result;
        }
        let result = parser::parse(source);
        if entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(source.to_string(), result.clone());
        result
    }

    /// Current number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
