#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-types** – shared data model for the weave deterministic simulator.
//!
//! This crate defines the value representation, blueprint schema, and event
//! log record shapes shared by every other `weave-*` crate. It owns no
//! behaviour: parsing a blueprint from an external format (YAML/JSON) is the
//! job of an excluded loader; this crate only defines the in-memory shape
//! that loader would produce.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Maximum length, in bytes, of a single string value accepted anywhere in a
/// blueprint or message payload. Mirrors the conservative length guards the
/// teacher runtime applies to untrusted input.
pub const MAX_STRING_LEN: usize = 1_048_576;

/// A row in a state-store table: column name to value.
pub type Row = IndexMap<String, Value>;

/// Opaque, deterministically generated identifier (event id, correlation id,
/// causation id). Always produced by a run's own RNG — see `weave-kernel`.
pub type EventId = String;

/// Alias of [`EventId`] used where a value is specifically a correlation id.
pub type CorrelationId = String;

/// A runtime value as seen by the expression engine and the state store.
///
/// `Unresolved` is the evaluator's sentinel for "no value" — it is never
/// produced by parsing a blueprint, only by expression evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absence of a value, distinct from evaluation failure.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer; the expression engine normalizes whole-valued floats to this.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// UTF-8 string literal, including template strings before substitution.
    Str(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Ordered mapping of string keys to values.
    Map(Row),
    /// Evaluator-internal sentinel: never present in parsed blueprint data.
    #[serde(skip)]
    Unresolved,
}

impl Value {
    /// True for [`Value::Unresolved`].
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Value::Unresolved)
    }

    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerces to `bool` the way callers that need a definite decision do:
    /// `Unresolved` and `Null` are falsy, as are `0`, `0.0`, and `""`.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Unresolved | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(xs) => !xs.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// Renders as the canonical JSON storage representation used by the
    /// state store and the state-fingerprint hash. `Unresolved` renders as
    /// `null`, matching the evaluation contract ("rendered as null outside").
    pub fn to_canonical_json(&self) -> serde_json::Value {
        match self {
            Value::Unresolved | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::json!(f),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(xs) => {
                serde_json::Value::Array(xs.iter().map(Value::to_canonical_json).collect())
            }
            Value::Map(m) => serde_json::Value::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_canonical_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unresolved | Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(fl) => write!(f, "{fl}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_canonical_json()),
        }
    }
}

/// Primitive column type as declared in a table schema. Informational for
/// storage mapping — the store itself is dynamically typed via [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveType {
    /// Arbitrary-precision-free signed integer.
    Int,
    /// IEEE-754 double.
    Float,
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared primitive type.
    pub ty: PrimitiveType,
    /// Whether this column is the table's primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether this column rejects null/missing values on write.
    #[serde(default)]
    pub not_null: bool,
}

/// Ordered column schema for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name, unique within its owning component.
    pub name: String,
    /// Ordered column definitions.
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// The schema's primary-key column, if declared.
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// True if `column` is declared in this schema.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }
}

/// Fields of a message type, consulted by the static analyzer when present.
/// Absent schemas make the analyzer permissive for that message (§4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSchema {
    /// Triggering message name this schema describes.
    pub message_name: String,
    /// Declared field names carried by the message payload.
    pub fields: Vec<String>,
}

/// One step of a handler's logic list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// `read(table, where?, key?, as)` — bind one row under `read.<as>`.
    Read {
        /// Table to read from.
        table: String,
        /// Equality predicate; `None` matches the first row.
        #[serde(default)]
        where_: Option<Row>,
        /// Primary-key value to look up directly, resolved against the
        /// table schema's declared primary-key column. ANDed with `where_`
        /// when both are present.
        #[serde(default)]
        key: Option<Value>,
        /// Local context alias the result is bound under.
        #[serde(rename = "as")]
        as_: String,
    },
    /// `create(table, data)` — data values may be template strings.
    Create {
        /// Table to insert into.
        table: String,
        /// Column values; evaluated as templates before the write.
        data: Row,
    },
    /// `update(table, set, where)` — `set` and `where` may be templates.
    Update {
        /// Table to update.
        table: String,
        /// Columns to assign.
        set: Row,
        /// Equality predicate selecting rows to update.
        #[serde(rename = "where")]
        where_: Row,
    },
    /// `send(to, message, payload)` — enqueue a new pending message.
    Send {
        /// Destination component name.
        to: String,
        /// Message name understood by the destination's handlers.
        message: String,
        /// Payload carried with the message; values may be templates.
        payload: Row,
    },
    /// `match(on, cases[])` — dispatch on the first matching case.
    Match {
        /// Expression evaluated once to obtain the dispatch value.
        on: String,
        /// Ordered list of cases; a case with no `when` is the default.
        cases: Vec<MatchCase>,
    },
}

/// One case of a `match` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    /// Expression compared against the `match`'s `on` value; `None` is the
    /// default case (must be last to be reachable).
    #[serde(default)]
    pub when: Option<Value>,
    /// Steps to prepend to the handler's remaining step list when chosen.
    pub steps: Vec<Step>,
}

/// A message-triggered handler belonging to one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    /// Message name that triggers this handler.
    pub on_message: String,
    /// Ordered steps executed when the handler runs.
    pub logic: Vec<Step>,
}

/// A named boolean expression checked after every commit point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invariant {
    /// Invariant name, used in `INVARIANT_FAIL` events and reports.
    pub name: String,
    /// Expression source, evaluated over a root-proxy view of the store.
    pub expression: String,
}

/// A component: a named owner of tables and handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Unique component name.
    pub name: String,
    /// Tables this component owns.
    #[serde(default)]
    pub tables: Vec<TableSchema>,
    /// Handlers this component exposes, keyed by triggering message.
    #[serde(default)]
    pub handlers: Vec<Handler>,
    /// Invariants checked after every commit point.
    #[serde(default)]
    pub invariants: Vec<Invariant>,
    /// Declared message schemas, consulted by the static analyzer.
    #[serde(default)]
    pub message_schemas: Vec<MessageSchema>,
}

/// Fault descriptor from `run.environment.faults`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Fault {
    /// Drops a send to `target` (or any target, if `"*"`) with `probability`.
    MessageDrop {
        /// Destination component name, or `"*"` for any.
        target: String,
        /// Probability in `[0, 1)` that a matching send is dropped.
        probability: f64,
    },
}

/// One row to seed into the store before a scenario runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialStateEntry {
    /// Owning component name.
    pub component: String,
    /// Table name.
    pub table: String,
    /// Rows to insert, in order.
    pub rows: Vec<Row>,
}

/// One external send issued at scenario start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSend {
    /// Destination component name.
    pub to: String,
    /// Message name.
    pub message: String,
    /// Payload carried with the message.
    pub payload: Row,
}

/// A named scenario: initial state plus an ordered sequence of external
/// sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Initial-state entries applied before the first send.
    #[serde(default)]
    pub initial_state: Vec<InitialStateEntry>,
    /// Ordered external sends that seed the task queue.
    pub sends: Vec<ExternalSend>,
}

/// A single explicit post-run invariant declared under `test.invariants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestInvariant {
    /// One of the named special checks (`score_matches_action_count`,
    /// `total_balance_conserved`) baked into the chaos matrix.
    Builtin {
        /// Special check name.
        name: String,
    },
    /// A `read.<alias>.<column>` style final-state assertion.
    FinalState {
        /// Expression evaluated against final state; must be truthy.
        expression: String,
    },
    /// An `always(A -> eventually(B))` style temporal property over the
    /// run's event log.
    Ltl {
        /// Expression evaluated once per event as the antecedent `A`.
        always: String,
        /// Expression that must eventually hold after `always` matches.
        eventually: String,
    },
}

/// Execution-time configuration, distinct from blueprint content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Hard cap on total events in one run before it is reported as a
    /// probable livelock. Defaults to 100,000 (§4.5).
    #[serde(default = "RunConfig::default_max_events")]
    pub max_events: u64,
    /// Whether an `INVARIANT_FAIL` event also halts the run. Defaults to
    /// `true`, matching the original implementation.
    #[serde(default = "RunConfig::default_strict_invariants")]
    pub strict_invariants: bool,
    /// Fault descriptors applied during this run.
    #[serde(default)]
    pub faults: Vec<Fault>,
}

impl RunConfig {
    fn default_max_events() -> u64 {
        100_000
    }

    fn default_strict_invariants() -> bool {
        true
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_events: Self::default_max_events(),
            strict_invariants: Self::default_strict_invariants(),
            faults: Vec::new(),
        }
    }
}

/// The full simulation input: components, scenarios, and run configuration.
/// Immutable at runtime; shared read-only across every parallel chaos run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Ordered components, leaves first is not required but conventional.
    pub components: Vec<Component>,
    /// Named scenarios available to be run.
    pub scenarios: Vec<Scenario>,
    /// Explicit post-run invariants checked by the chaos matrix.
    #[serde(default)]
    pub test_invariants: Vec<TestInvariant>,
    /// Run-time configuration (event cap, strictness, faults).
    #[serde(default)]
    pub run: RunConfig,
}

impl Blueprint {
    /// Finds a component by name.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Finds the scenario with the given name.
    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Finds the schema of the first table named `table`, by first match
    /// across components. Used to resolve a `read` step's `key` against
    /// the table's declared primary-key column.
    pub fn table_schema(&self, table: &str) -> Option<&TableSchema> {
        self.components
            .iter()
            .flat_map(|c| &c.tables)
            .find(|t| t.name == table)
    }

    /// Resolves the owning component of a table, by first match. Used to
    /// label the log event's `component` field even when a handler writes
    /// through a non-owner (§4.4: "writes from a non-owner are allowed but
    /// warned").
    pub fn owner_of(&self, table: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|c| c.tables.iter().any(|t| t.name == table))
            .map(|c| c.name.as_str())
    }

    /// Finds the handler in `component` triggered by `message`, if any.
    pub fn handler_for<'a>(&'a self, component: &str, message: &str) -> Option<&'a Handler> {
        self.component(component)
            .and_then(|c| c.handlers.iter().find(|h| h.on_message == message))
    }
}

/// Action recorded against one event log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventAction {
    /// A handler invocation started and ran to completion.
    HandlerExec,
    /// A row was created.
    Create,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
    /// An invariant failed.
    InvariantFail,
    /// A send was dropped by fault injection.
    FaultInjection,
}

/// One append-only event log record (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Deterministic id, unique within the run.
    pub event_id: EventId,
    /// Monotonically increasing local sequence number; the true ordering
    /// key — never the wall-clock timestamp.
    pub sequence: u64,
    /// Wall-clock timestamp, for human display only.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Identifier shared by every event descending from one scenario step.
    pub correlation_id: CorrelationId,
    /// Event id of the immediate parent event; `None` for scenario roots.
    pub causation_id: Option<EventId>,
    /// Component this event is attributed to.
    pub component: String,
    /// Name of the handler that produced this event, if any.
    pub handler_name: Option<String>,
    /// Name of the message that triggered the handler, if any.
    pub trigger_message: Option<String>,
    /// Table this event's action applies to, if any.
    pub table_name: Option<String>,
    /// What kind of action this event records.
    pub action: EventAction,
    /// Action payload (row data, fault descriptor, invariant name...).
    pub payload: serde_json::Value,
    /// Seed of the run that produced this event; constant across one run.
    pub simulation_seed: u64,
}

/// Sibling record persisted alongside an event log (§3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// Seed of the run this metadata describes.
    pub simulation_seed: u64,
    /// Scenario name executed.
    pub scenario_name: String,
    /// Wall-clock start time.
    pub start_timestamp: chrono::DateTime<chrono::Utc>,
    /// Wall-clock end time.
    pub end_timestamp: chrono::DateTime<chrono::Utc>,
    /// Total events recorded in this run.
    pub event_count: u64,
}
