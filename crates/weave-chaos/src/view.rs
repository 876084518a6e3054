//! Read-only views over a frozen state/event snapshot, so post-run
//! invariant expressions can reuse the same expression engine that evaluates
//! live invariants during a run instead of a bespoke string-matching parser
//! (`spec.md` §4.7, §4.8).

use std::collections::HashMap;
use std::sync::Arc;

use weave_expr::{ComponentView, RootView};
use weave_types::{Blueprint, Event, Row, Value};

/// A [`RootView`] over one run's final (or initial) state snapshot, rather
/// than a live store — built fresh for each post-run invariant check.
#[derive(Debug)]
pub(crate) struct SnapshotRootView {
    blueprint: Arc<Blueprint>,
    state: Arc<HashMap<(String, String), Vec<Row>>>,
}

impl SnapshotRootView {
    pub(crate) fn new(blueprint: Arc<Blueprint>, state: HashMap<(String, String), Vec<Row>>) -> Self {
        Self {
            blueprint,
            state: Arc::new(state),
        }
    }
}

impl RootView for SnapshotRootView {
    fn component(&self, component: &str) -> Option<Arc<dyn ComponentView>> {
        self.blueprint.component(component)?;
        Some(Arc::new(SnapshotComponentView {
            component: component.to_string(),
            state: self.state.clone(),
        }))
    }
}

#[derive(Debug)]
struct SnapshotComponentView {
    component: String,
    state: Arc<HashMap<(String, String), Vec<Row>>>,
}

impl ComponentView for SnapshotComponentView {
    fn table(&self, table: &str) -> Option<Vec<Row>> {
        self.state
            .get(&(self.component.clone(), table.to_string()))
            .cloned()
    }
}

/// Converts one recorded event into a `Value::Map` so an LTL-style
/// invariant's `always`/`eventually` expressions can address
/// `event.trigger_message`, `event.component`, and similar fields with the
/// same dotted syntax the rest of the engine uses.
pub(crate) fn event_to_value(event: &Event) -> Value {
    let mut row = Row::new();
    row.insert("component".to_string(), Value::Str(event.component.clone()));
    row.insert(
        "trigger_message".to_string(),
        event.trigger_message.clone().map(Value::Str).unwrap_or(Value::Null),
    );
    row.insert(
        "handler_name".to_string(),
        event.handler_name.clone().map(Value::Str).unwrap_or(Value::Null),
    );
    row.insert(
        "table_name".to_string(),
        event.table_name.clone().map(Value::Str).unwrap_or(Value::Null),
    );
    row.insert("action".to_string(), Value::Str(format!("{:?}", event.action)));
    row.insert("payload".to_string(), json_to_value(&event.payload));
    Value::Map(row)
}

/// Converts a `serde_json::Value` (an event's recorded payload) back into
/// the expression engine's own [`Value`] — the inverse of
/// [`Value::to_canonical_json`].
pub(crate) fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(xs) => Value::List(xs.iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            Value::Map(obj.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
        }
    }
}
