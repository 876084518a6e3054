//! Tree-walking evaluator.
//!
//! Every operator implements its own unresolved-propagation rule locally
//! and never panics or returns a `Result` — this mirrors `spec.md` §4.1's
//! evaluation contract ("evaluation never raises; any failure produces
//! unresolved") directly in the type signature: [`eval`] is infallible.

use weave_types::Value;

use crate::ast::{AddOp, CompareOp, Expr, MulOp};
use crate::context::{Context, Scoped};

const FUNCTION_WHITELIST: &[&str] = &["uuid", "sum", "all", "any", "len", "min", "max"];

/// Evaluates `ast` against `ctx`, never panicking. Returns raw (non
/// int-normalized) numeric results for nested calls; [`crate::Engine::eval`]
/// applies the final integer normalization exactly once, at the top.
pub fn eval(ast: &Expr, ctx: &dyn Context) -> Value {
    match ast {
        Expr::Number(n) => Value::Float(*n),
        Expr::Str(s) => Value::Str(s.clone()),
        Expr::True => Value::Bool(true),
        Expr::False => Value::Bool(false),
        Expr::Null => Value::Null,
        Expr::List(items) => Value::List(items.iter().map(|e| eval(e, ctx)).collect()),
        Expr::Variable(parts) => eval_variable(parts, ctx),
        Expr::Call(name, args) => eval_call(name, args, ctx),
        Expr::Or(terms) => eval_or(terms, ctx),
        Expr::And(terms) => eval_and(terms, ctx),
        Expr::Compare(first, chain) => eval_compare(first, chain, ctx),
        Expr::Add(first, chain) => eval_add(first, chain, ctx),
        Expr::Mul(first, chain) => eval_mul(first, chain, ctx),
        Expr::Neg(inner) => eval_neg(inner, ctx),
    }
}

fn eval_variable(parts: &[String], ctx: &dyn Context) -> Value {
    let Some(first) = parts.first() else {
        return Value::Unresolved;
    };
    let Some(mut scoped) = ctx.get(first) else {
        return Value::Unresolved;
    };
    for part in &parts[1..] {
        scoped = scoped.descend(part);
    }
    scoped.into_value()
}

fn eval_or(terms: &[Expr], ctx: &dyn Context) -> Value {
    let values: Vec<Value> = terms.iter().map(|t| eval(t, ctx)).collect();
    let mut left = values[0].clone();
    for right in &values[1..] {
        if left.truthy() {
            return Value::Bool(true);
        }
        left = right.clone();
    }
    left
}

fn eval_and(terms: &[Expr], ctx: &dyn Context) -> Value {
    let values: Vec<Value> = terms.iter().map(|t| eval(t, ctx)).collect();
    let mut left = values[0].clone();
    for right in &values[1..] {
        if !left.truthy() {
            return Value::Bool(false);
        }
        left = right.clone();
    }
    left
}

fn eval_compare(first: &Expr, chain: &[(CompareOp, Expr)], ctx: &dyn Context) -> Value {
    let mut left = eval(first, ctx);
    for (op, rhs_expr) in chain {
        let right = eval(rhs_expr, ctx);
        left = match op {
            CompareOp::Eq => Value::Bool(values_equal(&left, &right)),
            CompareOp::Neq => Value::Bool(!values_equal(&left, &right)),
            CompareOp::In => Value::Bool(value_in(&left, &right)),
            CompareOp::Gt | CompareOp::Lt | CompareOp::Gte | CompareOp::Lte => {
                if is_null_like(&left) || is_null_like(&right) {
                    return Value::Bool(false);
                }
                let (Some(l), Some(r)) = (as_f64(&left), as_f64(&right)) else {
                    return Value::Bool(false);
                };
                Value::Bool(match op {
                    CompareOp::Gt => l > r,
                    CompareOp::Lt => l < r,
                    CompareOp::Gte => l >= r,
                    CompareOp::Lte => l <= r,
                    _ => unreachable!(),
                })
            }
        };
    }
    left
}

fn eval_add(first: &Expr, chain: &[(AddOp, Expr)], ctx: &dyn Context) -> Value {
    let mut left = eval(first, ctx);
    for (op, rhs_expr) in chain {
        let right = eval(rhs_expr, ctx);
        if is_null_like(&left) || is_null_like(&right) {
            return Value::Unresolved;
        }
        let (Some(l), Some(r)) = (as_f64(&left), as_f64(&right)) else {
            return Value::Unresolved;
        };
        left = Value::Float(match op {
            AddOp::Add => l + r,
            AddOp::Sub => l - r,
        });
    }
    left
}

fn eval_mul(first: &Expr, chain: &[(MulOp, Expr)], ctx: &dyn Context) -> Value {
    let mut left = eval(first, ctx);
    for (op, rhs_expr) in chain {
        let right = eval(rhs_expr, ctx);
        if is_null_like(&left) || is_null_like(&right) {
            return Value::Unresolved;
        }
        let (Some(l), Some(r)) = (as_f64(&left), as_f64(&right)) else {
            return Value::Unresolved;
        };
        left = match op {
            MulOp::Mul => Value::Float(l * r),
            MulOp::Div => {
                if r == 0.0 {
                    return Value::Unresolved;
                }
                Value::Float(l / r)
            }
        };
    }
    left
}

fn eval_neg(inner: &Expr, ctx: &dyn Context) -> Value {
    match as_f64(&eval(inner, ctx)) {
        Some(n) => Value::Float(-n),
        None => Value::Unresolved,
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &dyn Context) -> Value {
    if !FUNCTION_WHITELIST.contains(&name) {
        return Value::Unresolved;
    }
    let values: Vec<Value> = args.iter().map(|a| eval(a, ctx)).collect();
    // "sum(xs)"/"all(xs)"/... with one list argument operate on the list's
    // elements; otherwise the call arguments themselves are the elements.
    let elements: Vec<Value> = if values.len() == 1 {
        if let Value::List(items) = &values[0] {
            items.clone()
        } else {
            values.clone()
        }
    } else {
        values.clone()
    };

    match name {
        "uuid" => Value::Str(uuid::Uuid::new_v4().simple().to_string()),
        "sum" => {
            let mut total = 0.0;
            for v in &elements {
                match as_f64(v) {
                    Some(n) => total += n,
                    None => return Value::Unresolved,
                }
            }
            Value::Float(total)
        }
        "all" => Value::Bool(elements.iter().all(Value::truthy)),
        "any" => Value::Bool(elements.iter().any(Value::truthy)),
        "len" => {
            if values.len() != 1 {
                return Value::Unresolved;
            }
            match &values[0] {
                Value::List(items) => Value::Int(items.len() as i64),
                Value::Str(s) => Value::Int(s.chars().count() as i64),
                Value::Map(m) => Value::Int(m.len() as i64),
                _ => Value::Unresolved,
            }
        }
        "min" | "max" => {
            if elements.is_empty() {
                return Value::Unresolved;
            }
            let mut best = elements[0].clone();
            for candidate in &elements[1..] {
                let (Some(a), Some(b)) = (as_f64(&best), as_f64(candidate)) else {
                    return Value::Unresolved;
                };
                let take = if name == "min" { b < a } else { b > a };
                if take {
                    best = candidate.clone();
                }
            }
            best
        }
        _ => Value::Unresolved,
    }
}

fn is_null_like(v: &Value) -> bool {
    matches!(v, Value::Null | Value::Unresolved)
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Equality treats `Null` and `Unresolved` as the same bucket, matching the
/// source's conflation of the two and `spec.md`'s "equality against the
/// literal null is legal" rule.
fn values_equal(a: &Value, b: &Value) -> bool {
    if is_null_like(a) || is_null_like(b) {
        return is_null_like(a) && is_null_like(b);
    }
    match (a, b) {
        (Value::Int(_) | Value::Float(_) | Value::Bool(_), Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            as_f64(a) == as_f64(b)
        }
        _ => a == b,
    }
}

fn value_in(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::List(items) => items.iter().any(|v| values_equal(needle, v)),
        Value::Str(s) => match needle {
            Value::Str(n) => s.contains(n.as_str()),
            _ => false,
        },
        Value::Map(m) => match needle {
            Value::Str(k) => m.contains_key(k),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MapContext;
    use crate::parser::parse;

    fn v(source: &str, ctx: &dyn Context) -> Value {
        eval(&parse(source).unwrap(), ctx)
    }

    #[test]
    fn arithmetic_precedence() {
        let ctx = MapContext::new();
        assert_eq!(v("1 + 2 * 3", &ctx), Value::Float(7.0));
    }

    #[test]
    fn division_by_zero_is_unresolved() {
        let ctx = MapContext::new();
        assert_eq!(v("1 / 0", &ctx), Value::Unresolved);
    }

    #[test]
    fn ordered_comparison_with_null_is_false() {
        let ctx = MapContext::new().with("x", Value::Null);
        assert_eq!(v("x > 1", &ctx), Value::Bool(false));
    }

    #[test]
    fn equality_against_null_is_legal() {
        let ctx = MapContext::new().with("x", Value::Null);
        assert_eq!(v("x == null", &ctx), Value::Bool(true));
        assert_eq!(v("1 == null", &ctx), Value::Bool(false));
    }

    #[test]
    fn missing_variable_is_unresolved() {
        let ctx = MapContext::new();
        assert_eq!(v("missing.field", &ctx), Value::Unresolved);
    }

    #[test]
    fn list_projection() {
        let mut m1 = weave_types::Row::new();
        m1.insert("v".into(), Value::Int(1));
        let mut m2 = weave_types::Row::new();
        m2.insert("v".into(), Value::Int(2));
        let ctx = MapContext::new().with("xs", Value::List(vec![Value::Map(m1), Value::Map(m2)]));
        assert_eq!(v("sum(xs.v)", &ctx), Value::Float(3.0));
    }

    #[test]
    fn disallowed_function_is_unresolved() {
        let ctx = MapContext::new();
        assert_eq!(v("nope(1)", &ctx), Value::Unresolved);
    }

    #[test]
    fn min_max_over_empty_list_is_unresolved() {
        let ctx = MapContext::new().with("xs", Value::List(vec![]));
        assert_eq!(v("min(xs)", &ctx), Value::Unresolved);
        assert_eq!(v("max(xs)", &ctx), Value::Unresolved);
    }

    #[test]
    fn logical_or_returns_non_bool_when_falling_through() {
        // mirrors the source's "left or right" semantics: a falsy left
        // operand is simply replaced by the untouched right operand.
        let ctx = MapContext::new();
        assert_eq!(v("false or 5", &ctx), Value::Float(5.0));
    }

    #[test]
    fn logical_and_with_falsy_left_returns_false() {
        let ctx = MapContext::new();
        assert_eq!(v("false and (1/0)", &ctx), Value::Bool(false));
    }

    #[test]
    fn string_in_list() {
        let ctx = MapContext::new();
        assert_eq!(v("\"b\" in [\"a\", \"b\"]", &ctx), Value::Bool(true));
    }
}
