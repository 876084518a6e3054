//! Abstract syntax tree for parsed expressions.

/// A binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Neq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
    /// `in`
    In,
}

/// An additive operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOp {
    /// `+`
    Add,
    /// `-`
    Sub,
}

/// A multiplicative operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulOp {
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// Parsed expression tree. Every variant maps directly onto one grammar
/// production in `spec.md` §4.1.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal (always stored as `f64`; int-normalization happens
    /// once, at the outer evaluation boundary).
    Number(f64),
    /// String literal.
    Str(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[a, b, c]`
    List(Vec<Expr>),
    /// Dotted variable access, e.g. `msg.payload.id`.
    Variable(Vec<String>),
    /// Whitelisted function call.
    Call(String, Vec<Expr>),
    /// Left-associative chain of `or`.
    Or(Vec<Expr>),
    /// Left-associative chain of `and`.
    And(Vec<Expr>),
    /// Left-associative chain of comparisons.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    /// Left-associative chain of `+`/`-`.
    Add(Box<Expr>, Vec<(AddOp, Expr)>),
    /// Left-associative chain of `*`/`/`.
    Mul(Box<Expr>, Vec<(MulOp, Expr)>),
    /// Unary negation.
    Neg(Box<Expr>),
}

impl Expr {
    /// Collects every dotted variable path referenced anywhere in this
    /// expression tree, in traversal order. Used by the static analyzer
    /// (`weave-analyzer`) to check each reference against the handler's
    /// lexical scope; never used during evaluation itself.
    pub fn variable_paths(&self) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Vec<String>>) {
        match self {
            Expr::Number(_) | Expr::Str(_) | Expr::True | Expr::False | Expr::Null => {}
            Expr::List(items) => items.iter().for_each(|e| e.collect_variables(out)),
            Expr::Variable(parts) => out.push(parts.clone()),
            Expr::Call(_, args) => args.iter().for_each(|e| e.collect_variables(out)),
            Expr::Or(terms) | Expr::And(terms) => {
                terms.iter().for_each(|e| e.collect_variables(out))
            }
            Expr::Compare(first, chain) => {
                first.collect_variables(out);
                chain.iter().for_each(|(_, e)| e.collect_variables(out));
            }
            Expr::Add(first, chain) => {
                first.collect_variables(out);
                chain.iter().for_each(|(_, e)| e.collect_variables(out));
            }
            Expr::Mul(first, chain) => {
                first.collect_variables(out);
                chain.iter().for_each(|(_, e)| e.collect_variables(out));
            }
            Expr::Neg(inner) => inner.collect_variables(out),
        }
    }
}
