//! Template string substitution (`spec.md` §4.1 "Template strings").
//!
//! A string of the form `"literal text {{ expr }} more text"` is resolved
//! by substituting each `{{...}}` region with its evaluated, stringified
//! value. A string consisting solely of one such region returns the
//! native value rather than a stringified one.

use weave_types::Value;

use crate::Engine;
use crate::context::Context;

/// Renders `source` as a template against `ctx` using `engine`'s cache.
pub fn render(engine: &Engine, source: &str, ctx: &dyn Context) -> Value {
    let regions = find_regions(source);
    if regions.is_empty() {
        return Value::Str(source.to_string());
    }
    if regions.len() == 1 {
        let (start, end, inner) = &regions[0];
        if *start == 0 && *end == source.len() {
            return engine.eval(inner, ctx);
        }
    }

    let mut out = String::new();
    let mut cursor = 0;
    for (start, end, inner) in &regions {
        out.push_str(&source[cursor..*start]);
        out.push_str(&engine.eval(inner, ctx).to_string());
        cursor = *end;
    }
    out.push_str(&source[cursor..]);
    Value::Str(out)
}

/// Returns the inner source of every `{{ ... }}` region in `source`, in
/// order. Used by the static analyzer to find every embedded expression in
/// a string without needing to render it.
pub fn template_expressions(source: &str) -> Vec<String> {
    find_regions(source).into_iter().map(|(_, _, inner)| inner).collect()
}

/// Finds every `{{ ... }}` region, returning `(byte_start, byte_end, inner)`
/// triples in source order. Malformed (unterminated) regions are left as
/// literal text, matching the evaluator's "never raises" contract.
fn find_regions(source: &str) -> Vec<(usize, usize, String)> {
    let mut regions = Vec::new();
    let mut search_from = 0;
    while let Some(rel_start) = source[search_from..].find("{{") {
        let start = search_from + rel_start;
        let Some(rel_end) = source[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + rel_end + 2;
        let inner = source[start + 2..start + 2 + rel_end].trim().to_string();
        regions.push((start, end, inner));
        search_from = end;
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MapContext;

    #[test]
    fn whole_string_template_returns_native_value() {
        let engine = Engine::default();
        let ctx = MapContext::new().with("x", Value::Int(42));
        assert_eq!(render(&engine, "{{ x }}", &ctx), Value::Int(42));
    }

    #[test]
    fn mixed_template_stringifies() {
        let engine = Engine::default();
        let ctx = MapContext::new().with("x", Value::Int(42));
        assert_eq!(
            render(&engine, "value is {{ x }} exactly", &ctx),
            Value::Str("value is 42 exactly".to_string())
        );
    }

    #[test]
    fn no_template_region_is_literal() {
        let engine = Engine::default();
        let ctx = MapContext::new();
        assert_eq!(render(&engine, "plain text", &ctx), Value::Str("plain text".to_string()));
    }
}
