//! The read-only evaluation context, including lazy state-store proxies.
//!
//! Design note (`spec.md` §9): invariant expressions address the state
//! store through tagged variants — a literal value, a component view, or a
//! table view — rather than by eagerly materialising every table into the
//! context on every check. [`ComponentView`] and [`TableView`] are the
//! traits a state store implements to provide that view; [`Scoped`] is
//! what a [`Context`] hands back for one name lookup.

use std::sync::Arc;

use weave_types::{Row, Value};

/// A live view of one component's tables, handed out by a [`RootView`].
/// Implemented by the state store (`weave-store`); kept here as a trait so
/// the expression engine never depends on the store crate.
pub trait ComponentView: std::fmt::Debug + Send + Sync {
    /// Returns the live rows of `table`, or `None` if no such table exists
    /// on this component.
    fn table(&self, table: &str) -> Option<Vec<Row>>;
}

/// A live view of the whole state store, handed out by a [`Context`] for
/// the name `root`.
pub trait RootView: std::fmt::Debug + Send + Sync {
    /// Returns the view of `component`, or `None` if no such component
    /// exists.
    fn component(&self, component: &str) -> Option<Arc<dyn ComponentView>>;
}

/// What a name resolves to, one segment at a time. A plain [`Value`] is a
/// leaf; the view variants defer materialisation until a leaf is finally
/// reached (`.field` on a component view yields a table's rows as a
/// [`Value::List`], never before it is asked for).
#[derive(Debug, Clone)]
pub enum Scoped {
    /// A concrete, already-materialised value.
    Value(Value),
    /// An unresolved reference to the whole state store.
    Root(Arc<dyn RootView>),
    /// An unresolved reference to one component's tables.
    Component(Arc<dyn ComponentView>),
}

impl Scoped {
    /// Descends one dotted segment, matching the variable-resolution rule
    /// in `spec.md` §4.1: list projection on value lists, `root.<C>` on the
    /// root view, `.<Table>` on a component view, or a plain map/list get.
    pub fn descend(&self, segment: &str) -> Scoped {
        match self {
            Scoped::Root(root) => match root.component(segment) {
                Some(view) => Scoped::Component(view),
                None => Scoped::Value(Value::Unresolved),
            },
            Scoped::Component(view) => match view.table(segment) {
                Some(rows) => Scoped::Value(Value::List(
                    rows.into_iter().map(Value::Map).collect(),
                )),
                None => Scoped::Value(Value::Unresolved),
            },
            Scoped::Value(Value::Map(m)) => {
                Scoped::Value(m.get(segment).cloned().unwrap_or(Value::Unresolved))
            }
            Scoped::Value(Value::List(items)) => {
                // list projection: xs.field -> [x.field for x in xs]
                let projected = items
                    .iter()
                    .map(|item| match item {
                        Value::Map(m) => m.get(segment).cloned().unwrap_or(Value::Unresolved),
                        _ => Value::Unresolved,
                    })
                    .collect();
                Scoped::Value(Value::List(projected))
            }
            Scoped::Value(_) => Scoped::Value(Value::Unresolved),
        }
    }

    /// Collapses to a final [`Value`], treating any still-unresolved view
    /// variant (a bare `root` or component reference with no further
    /// segments) as [`Value::Unresolved`].
    pub fn into_value(self) -> Value {
        match self {
            Scoped::Value(v) => v,
            Scoped::Root(_) | Scoped::Component(_) => Value::Unresolved,
        }
    }
}

/// The read-only name -> value mapping an expression is evaluated against.
pub trait Context {
    /// Resolves the first dotted segment of a variable reference.
    fn get(&self, name: &str) -> Option<Scoped>;
}

/// A [`Context`] backed by a plain map, for handler/template scopes
/// (`msg.*`, `trigger.*`, `read.<alias>.*`) that never need lazy proxies.
#[derive(Debug, Default, Clone)]
pub struct MapContext {
    vars: Row,
}

impl MapContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self { vars: Row::new() }
    }

    /// Binds `name` to `value`, returning `self` for chained construction.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    /// Binds `name` to `value` in place.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }
}

impl Context for MapContext {
    fn get(&self, name: &str) -> Option<Scoped> {
        self.vars.get(name).cloned().map(Scoped::Value)
    }
}

/// A [`Context`] that additionally exposes `root` as a lazy store proxy,
/// for invariant evaluation.
#[derive(Debug, Clone)]
pub struct RootContext {
    vars: Row,
    root: Arc<dyn RootView>,
}

impl RootContext {
    /// Creates a context exposing `root` alongside any other bindings.
    pub fn new(root: Arc<dyn RootView>) -> Self {
        Self {
            vars: Row::new(),
            root,
        }
    }

    /// Binds an additional plain variable, returning `self`.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }
}

impl Context for RootContext {
    fn get(&self, name: &str) -> Option<Scoped> {
        if name == "root" {
            return Some(Scoped::Root(self.root.clone()));
        }
        self.vars.get(name).cloned().map(Scoped::Value)
    }
}
