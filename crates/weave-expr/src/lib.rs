#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-expr** – sandboxed pure-functional expression engine (C1).
//!
//! Parses and evaluates the small grammar described in `spec.md` §4.1:
//! logical/comparison/arithmetic expressions, dotted variable access with
//! list projection, a whitelisted function set, and `{{ ... }}` template
//! strings. Evaluation never panics and never returns an error to the
//! caller — any parse or runtime failure resolves to
//! [`weave_types::Value::Unresolved`], which external callers render as
//! `null`.

mod ast;
mod cache;
mod context;
mod eval;
mod parser;
mod template;
mod token;

pub use ast::Expr;
pub use cache::{ParseCache, DEFAULT_CAPACITY};
pub use context::{ComponentView, Context, MapContext, RootContext, RootView, Scoped};
pub use parser::{parse as parse_expr, ParseError};
pub use template::template_expressions;
pub use token::{LexError, Token};

use weave_types::Value;

/// Owns a bounded parse cache and evaluates expressions against it. One
/// `Engine` is shared across a run (or a whole process); it holds no
/// per-run state itself.
#[derive(Default)]
pub struct Engine {
    cache: ParseCache,
}

impl Engine {
    /// Creates an engine with the default cache capacity
    /// ([`DEFAULT_CAPACITY`]).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with an explicit cache capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: ParseCache::new(capacity),
        }
    }

    /// Evaluates `source` against `ctx`. Never panics; any parse or
    /// runtime failure yields [`Value::Unresolved`]. Numeric results whose
    /// fractional part is zero are normalized to [`Value::Int`], matching
    /// `spec.md` §4.1.
    pub fn eval(&self, source: &str, ctx: &dyn Context) -> Value {
        let ast = match self.cache.parse(source) {
            Ok(ast) => ast,
            Err(_) => return Value::Unresolved,
        };
        normalize(eval::eval(&ast, ctx))
    }

    /// Renders `source` as a template string (`spec.md` §4.1 "Template
    /// strings"), substituting each `{{ ... }}` region.
    pub fn render_template(&self, source: &str, ctx: &dyn Context) -> Value {
        template::render(self, source, ctx)
    }

    /// Number of entries currently held in the parse cache.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

fn normalize(value: Value) -> Value {
    match value {
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Value::Int(f as i64),
        other => other,
    }
}
