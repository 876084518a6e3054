#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-store** – per-run keyed table state store (C4).
//!
//! Tables are keyed by `(component, table)` (`spec.md` §3). All mutation
//! goes through [`StateStore::write`], which enforces the CREATE/UPDATE/
//! DELETE validity rules of `spec.md` §4.4; reads go through
//! [`StateStore::read`]. [`StateStore::root_view`] hands out the lazy
//! [`weave_expr::RootView`]/[`weave_expr::ComponentView`] proxies the
//! expression engine uses to evaluate invariants without ever
//! materialising the whole store up front.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use weave_expr::{ComponentView, RootView};
use weave_types::{Blueprint, Row, Value};

/// Kind of mutation a write performs (`spec.md` §4.5 step kinds map onto
/// these one-for-one: `create` -> `Create`, `update` -> `Update`; `Delete`
/// has no dedicated step in the handler language but is specified in §4.4
/// and exercised directly by tests and the chaos matrix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Insert a new row.
    Create,
    /// Update columns on rows matching a predicate.
    Update,
    /// Remove rows matching a predicate.
    Delete,
}

/// Failure modes for [`StateStore::write`] (`spec.md` §4.4, §7
/// `InvalidWrite`). The caller (kernel) logs these and treats the
/// originating step as a no-op; they are never propagated as a run
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// `create` was called with an empty `data` map.
    #[error("CREATE requires non-empty data")]
    EmptyCreateData,
    /// `update` was called with an empty `data` or `where` map.
    #[error("UPDATE requires non-empty data and where clause")]
    EmptyUpdateClause,
    /// A column name appeared in both `update`'s `data` and `where`.
    #[error("UPDATE rejects columns present in both data and where: {0:?}")]
    UpdateColumnOverlap(Vec<String>),
    /// `delete` was called with an empty `where` map.
    #[error("DELETE requires non-empty where clause")]
    EmptyDeleteWhere,
}

/// Outcome of a successful write: enough detail for the kernel to append
/// one event log record per `spec.md` §4.3's atomicity contract.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// Component the table's schema resolves to, which may differ from
    /// the component that issued the write (`spec.md` §4.4: "writes from
    /// a non-owner are allowed but warned").
    pub owner_component: String,
    /// Kind of mutation performed.
    pub kind: WriteKind,
    /// Table mutated.
    pub table: String,
    /// Rows affected: the inserted row for `Create`, the post-image rows
    /// for `Update`, the removed rows for `Delete`.
    pub rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<(String, String), Vec<Row>>,
}

/// Per-run state store. Cheaply cloneable: clones share the same
/// underlying tables (an `Arc<RwLock<..>>`), which is what lets
/// [`StateStore::root_view`] hand out live proxies without copying.
#[derive(Clone)]
pub struct StateStore {
    blueprint: Arc<Blueprint>,
    inner: Arc<RwLock<Inner>>,
}

impl StateStore {
    /// Creates an empty store scoped to `blueprint`.
    pub fn new(blueprint: Arc<Blueprint>) -> Self {
        Self {
            blueprint,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Seeds `table` on `component` with `rows`, for initial-state loading
    /// (`spec.md` §3 "initial-state entries"). Does not go through
    /// [`StateStore::write`] and is not logged — initial state precedes
    /// the event log's first event.
    pub fn seed(&self, component: &str, table: &str, rows: Vec<Row>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .tables
            .entry((component.to_string(), table.to_string()))
            .or_default()
            .extend(rows);
    }

    /// Resolves the owning component of `table` via the blueprint, falling
    /// back to `requesting_component` (with a warning) when no declared
    /// owner exists — matching §4.4's "writes from a non-owner are
    /// allowed but warned" and the read path's equivalent tolerance.
    fn resolve_owner(&self, requesting_component: &str, table: &str) -> String {
        match self.blueprint.owner_of(table) {
            Some(owner) => {
                if owner != requesting_component {
                    tracing::warn!(
                        requesting_component,
                        owner,
                        table,
                        "write/read issued by non-owner component"
                    );
                }
                owner.to_string()
            }
            None => {
                tracing::warn!(requesting_component, table, "no declared owner for table");
                requesting_component.to_string()
            }
        }
    }

    /// Looks up the first row in `table` matching the equality predicate
    /// `where_`. Invalid identifier keys in `where_` are ignored with a
    /// recorded warning (`spec.md` §4.4).
    pub fn read(&self, requesting_component: &str, table: &str, where_: &Row) -> Option<Row> {
        let owner = self.resolve_owner(requesting_component, table);
        let predicate = sanitize_predicate(where_);
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .tables
            .get(&(owner, table.to_string()))
            .and_then(|rows| rows.iter().find(|row| row_matches(row, &predicate)).cloned())
    }

    /// Performs a CREATE/UPDATE/DELETE mutation, enforcing the validity
    /// rules of `spec.md` §4.4. `Update` and `Delete` affect every
    /// matching row, mirroring a relational `UPDATE`/`DELETE ... WHERE`.
    pub fn write(
        &self,
        requesting_component: &str,
        table: &str,
        kind: WriteKind,
        data: Row,
        where_: Option<Row>,
    ) -> Result<WriteOutcome, StoreError> {
        let owner = self.resolve_owner(requesting_component, table);
        let key = (owner.clone(), table.to_string());

        let rows = match kind {
            WriteKind::Create => {
                if data.is_empty() {
                    return Err(StoreError::EmptyCreateData);
                }
                let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
                inner.tables.entry(key).or_default().push(data.clone());
                vec![data]
            }
            WriteKind::Update => {
                let where_ = where_.unwrap_or_default();
                if data.is_empty() || where_.is_empty() {
                    return Err(StoreError::EmptyUpdateClause);
                }
                let overlap: Vec<String> = data.keys().filter(|k| where_.contains_key(*k)).cloned().collect();
                if !overlap.is_empty() {
                    return Err(StoreError::UpdateColumnOverlap(overlap));
                }
                let predicate = sanitize_predicate(&where_);
                let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
                let mut updated = Vec::new();
                if let Some(table_rows) = inner.tables.get_mut(&key) {
                    for row in table_rows.iter_mut() {
                        if row_matches(row, &predicate) {
                            for (column, value) in &data {
                                row.insert(column.clone(), value.clone());
                            }
                            updated.push(row.clone());
                        }
                    }
                }
                updated
            }
            WriteKind::Delete => {
                let where_ = where_.unwrap_or_default();
                if where_.is_empty() {
                    return Err(StoreError::EmptyDeleteWhere);
                }
                let predicate = sanitize_predicate(&where_);
                let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
                let mut removed = Vec::new();
                if let Some(table_rows) = inner.tables.get_mut(&key) {
                    table_rows.retain(|row| {
                        let matches = row_matches(row, &predicate);
                        if matches {
                            removed.push(row.clone());
                        }
                        !matches
                    });
                }
                removed
            }
        };

        Ok(WriteOutcome {
            owner_component: owner,
            kind,
            table: table.to_string(),
            rows,
        })
    }

    /// Hands out the lazy root proxy the expression engine evaluates
    /// `root.<Component>.<Table>` references against (`spec.md` §4.1,
    /// §9 "Lazy state proxies for invariants").
    pub fn root_view(&self) -> Arc<dyn RootView> {
        Arc::new(StoreRootView {
            blueprint: self.blueprint.clone(),
            inner: self.inner.clone(),
        })
    }

    /// Snapshot of every table as `(component, table) -> rows`, for state
    /// fingerprinting (`spec.md` §4.7) and final-state assertions.
    pub fn snapshot(&self) -> HashMap<(String, String), Vec<Row>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).tables.clone()
    }
}

/// Drops predicate keys that are not valid identifiers, matching §4.4's
/// "invalid identifier keys are ignored (with a recorded warning)".
fn sanitize_predicate(where_: &Row) -> Row {
    where_
        .iter()
        .filter_map(|(key, value)| {
            if is_valid_identifier(key) {
                Some((key.clone(), value.clone()))
            } else {
                tracing::warn!(key, "ignoring invalid identifier in where clause");
                None
            }
        })
        .collect()
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn row_matches(row: &Row, predicate: &Row) -> bool {
    predicate.iter().all(|(column, expected)| {
        row.get(column).map(|actual| values_equal(actual, expected)).unwrap_or(false)
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        _ => a == b,
    }
}

#[derive(Debug, Clone)]
struct StoreRootView {
    blueprint: Arc<Blueprint>,
    inner: Arc<RwLock<Inner>>,
}

impl RootView for StoreRootView {
    fn component(&self, component: &str) -> Option<Arc<dyn ComponentView>> {
        self.blueprint.component(component)?;
        Some(Arc::new(StoreComponentView {
            component: component.to_string(),
            inner: self.inner.clone(),
        }))
    }
}

#[derive(Debug, Clone)]
struct StoreComponentView {
    component: String,
    inner: Arc<RwLock<Inner>>,
}

impl ComponentView for StoreComponentView {
    fn table(&self, table: &str) -> Option<Vec<Row>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.tables.get(&(self.component.clone(), table.to_string())).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::{Component, RunConfig, Scenario, TableSchema, TestInvariant};

    fn blueprint_with_table(component: &str, table: &str) -> Arc<Blueprint> {
        Arc::new(Blueprint {
            components: vec![Component {
                name: component.to_string(),
                tables: vec![TableSchema {
                    name: table.to_string(),
                    columns: vec![],
                }],
                handlers: vec![],
                invariants: vec![],
                message_schemas: vec![],
            }],
            scenarios: Vec::<Scenario>::new(),
            test_invariants: Vec::<TestInvariant>::new(),
            run: RunConfig::default(),
        })
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn create_then_read_round_trips() {
        let store = StateStore::new(blueprint_with_table("A", "t"));
        store
            .write("A", "t", WriteKind::Create, row(&[("id", Value::Str("x".into())), ("v", Value::Int(1))]), None)
            .unwrap();
        let got = store.read("A", "t", &row(&[("id", Value::Str("x".into()))])).unwrap();
        assert_eq!(got.get("v"), Some(&Value::Int(1)));
    }

    #[test]
    fn create_requires_non_empty_data() {
        let store = StateStore::new(blueprint_with_table("A", "t"));
        let err = store.write("A", "t", WriteKind::Create, Row::new(), None).unwrap_err();
        assert_eq!(err, StoreError::EmptyCreateData);
    }

    #[test]
    fn update_rejects_overlapping_columns() {
        let store = StateStore::new(blueprint_with_table("A", "t"));
        store
            .write("A", "t", WriteKind::Create, row(&[("id", Value::Str("x".into()))]), None)
            .unwrap();
        let err = store
            .write(
                "A",
                "t",
                WriteKind::Update,
                row(&[("id", Value::Str("y".into()))]),
                Some(row(&[("id", Value::Str("x".into()))])),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::UpdateColumnOverlap(_)));
    }

    #[test]
    fn update_affects_all_matching_rows() {
        let store = StateStore::new(blueprint_with_table("A", "t"));
        store.write("A", "t", WriteKind::Create, row(&[("grp", Value::Str("g".into())), ("v", Value::Int(1))]), None).unwrap();
        store.write("A", "t", WriteKind::Create, row(&[("grp", Value::Str("g".into())), ("v", Value::Int(2))]), None).unwrap();
        let outcome = store
            .write(
                "A",
                "t",
                WriteKind::Update,
                row(&[("v", Value::Int(9))]),
                Some(row(&[("grp", Value::Str("g".into()))])),
            )
            .unwrap();
        assert_eq!(outcome.rows.len(), 2);
    }

    #[test]
    fn delete_requires_where() {
        let store = StateStore::new(blueprint_with_table("A", "t"));
        let err = store.write("A", "t", WriteKind::Delete, Row::new(), None).unwrap_err();
        assert_eq!(err, StoreError::EmptyDeleteWhere);
    }

    #[test]
    fn delete_removes_matching_rows() {
        let store = StateStore::new(blueprint_with_table("A", "t"));
        store.write("A", "t", WriteKind::Create, row(&[("id", Value::Str("x".into()))]), None).unwrap();
        store
            .write("A", "t", WriteKind::Delete, Row::new(), Some(row(&[("id", Value::Str("x".into()))])))
            .unwrap();
        assert!(store.read("A", "t", &row(&[("id", Value::Str("x".into()))])).is_none());
    }

    #[test]
    fn root_view_exposes_live_rows() {
        let store = StateStore::new(blueprint_with_table("A", "t"));
        store.write("A", "t", WriteKind::Create, row(&[("id", Value::Str("x".into()))]), None).unwrap();
        let view = store.root_view();
        let comp = view.component("A").unwrap();
        let rows = comp.table("t").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(view.component("Missing").is_none());
    }

    #[test]
    fn non_owner_write_is_allowed_with_resolved_owner() {
        let store = StateStore::new(blueprint_with_table("Owner", "t"));
        let outcome = store
            .write("OtherComponent", "t", WriteKind::Create, row(&[("id", Value::Str("x".into()))]), None)
            .unwrap();
        assert_eq!(outcome.owner_component, "Owner");
    }

    #[test]
    fn invalid_identifier_in_where_is_ignored() {
        let store = StateStore::new(blueprint_with_table("A", "t"));
        store.write("A", "t", WriteKind::Create, row(&[("id", Value::Str("x".into()))]), None).unwrap();
        let mut bad_where = Row::new();
        bad_where.insert("id; DROP TABLE t".to_string(), Value::Str("x".into()));
        // The malformed key is dropped, leaving an empty predicate which
        // still matches the first row per the store's "no predicate"
        // semantics for read.
        let got = store.read("A", "t", &bad_where);
        assert!(got.is_some());
    }
}
