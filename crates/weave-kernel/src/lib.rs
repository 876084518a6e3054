#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-kernel** – deterministic scheduler and handler interpreter (C5).
//!
//! One [`Kernel`] executes exactly one scenario under one seed: it owns the
//! run's private RNG, its [`weave_store::StateStore`], and its
//! [`weave_eventlog::EventLog`] (`spec.md` §4.5, §8 "never share an RNG
//! across runs or threads"). [`Kernel::new`] re-runs static analysis
//! (`spec.md` §4.2) before accepting a scenario, so a kernel can never be
//! built from a blueprint with out-of-scope expressions. [`Kernel::run`]
//! drives the scheduler to completion, to the event cap, or to the first
//! invariant failure under strict mode.

mod error;
mod id;
mod task;

use std::collections::VecDeque;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use weave_expr::{Context, Engine, MapContext, RootContext};
use weave_eventlog::EventLog;
use weave_store::{StateStore, WriteKind};
use weave_types::{Blueprint, Event, EventAction, Fault, Row, SimulationMetadata, Step, Value};

pub use error::KernelError;

use task::{HandlerTask, PendingSend, Task};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The task queue drained naturally.
    Completed,
    /// `run.max_events` was reached before the queue drained (`spec.md`
    /// §4.5 — probable livelock).
    EventCapReached,
    /// An invariant evaluated falsy under `run.strict_invariants` (default
    /// on), halting the run immediately after logging the failure.
    InvariantFailed {
        /// Name of the invariant that failed.
        invariant: String,
    },
}

/// Result of driving a [`Kernel`] to completion: every event the run
/// produced, the sibling metadata record, and how the run ended.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// How the run terminated.
    pub outcome: RunOutcome,
    /// Every event recorded, in sequence order.
    pub events: Vec<Event>,
    /// Sibling metadata record (`spec.md` §3, §6).
    pub metadata: SimulationMetadata,
    /// Final state of every table, for fingerprinting and final-state
    /// assertions (`spec.md` §4.7, §4.8).
    pub final_state: std::collections::HashMap<(String, String), Vec<Row>>,
    /// State immediately after seeding, before any handler ran — the
    /// baseline a conservation-style invariant (e.g. "total balance
    /// unchanged") compares the final state against.
    pub initial_state: std::collections::HashMap<(String, String), Vec<Row>>,
}

/// One deterministic run of one scenario against one blueprint.
pub struct Kernel {
    blueprint: Arc<Blueprint>,
    rng: StdRng,
    seed: u64,
    store: StateStore,
    log: EventLog,
    engine: Engine,
    queue: VecDeque<Task>,
    system_correlation_id: String,
}

impl Kernel {
    /// Re-analyzes `blueprint` and, if it passes, constructs a kernel ready
    /// to run any of its scenarios under `seed`.
    pub fn new(blueprint: Arc<Blueprint>, seed: u64) -> Result<Self, KernelError> {
        weave_analyzer::analyze(&blueprint)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let system_correlation_id = id::generate_id(&mut rng, "sys");
        Ok(Self {
            store: StateStore::new(blueprint.clone()),
            log: EventLog::open(seed, String::new(), chrono::Utc::now()),
            engine: Engine::new(),
            queue: VecDeque::new(),
            system_correlation_id,
            blueprint,
            rng,
            seed,
        })
    }

    /// Runs `scenario_name` to completion, to the event cap, or to the
    /// first invariant failure. Consumes the kernel: one kernel is good for
    /// exactly one run (`spec.md` §4.8 — each chaos-matrix run gets its own
    /// isolated kernel, store, and log).
    pub fn run(mut self, scenario_name: &str) -> Result<RunReport, KernelError> {
        let scenario = self
            .blueprint
            .scenario(scenario_name)
            .ok_or_else(|| KernelError::UnknownScenario(scenario_name.to_string()))?
            .clone();

        self.log = EventLog::open(self.seed, scenario_name.to_string(), chrono::Utc::now());

        for entry in &scenario.initial_state {
            self.store.seed(&entry.component, &entry.table, entry.rows.clone());
        }
        let initial_state = self.store.snapshot();

        let root_correlation_id = id::generate_id(&mut self.rng, "tx");
        for send in &scenario.sends {
            self.queue.push_back(Task::Dispatch(PendingSend {
                to: send.to.clone(),
                message: send.message.clone(),
                payload: send.payload.clone(),
                correlation_id: root_correlation_id.clone(),
                causation_id: None,
            }));
        }

        let max_events = self.blueprint.run.max_events;
        let strict = self.blueprint.run.strict_invariants;
        let mut outcome = RunOutcome::Completed;

        loop {
            let Some(task) = self.pop_task() else {
                break;
            };
            match task {
                Task::Dispatch(send) => self.dispatch(send),
                Task::Handler(mut handler_task) => {
                    if let Some(step) = handler_task.steps.pop_front() {
                        self.execute_step(&mut handler_task, step);
                    }
                    if handler_task.steps.is_empty() {
                        if let Some(failed) = self.check_invariants(strict) {
                            outcome = RunOutcome::InvariantFailed { invariant: failed };
                            break;
                        }
                    } else {
                        self.queue.push_back(Task::Handler(handler_task));
                    }
                }
            }
            if self.log.len() as u64 >= max_events {
                outcome = RunOutcome::EventCapReached;
                break;
            }
        }

        let final_state = self.store.snapshot();
        let (events, metadata) = self.log.close(chrono::Utc::now());
        Ok(RunReport {
            outcome,
            events,
            metadata,
            final_state,
            initial_state,
        })
    }

    /// Pops one task from the queue following `spec.md` §4.5's randomized
    /// scheduling rule: a draw is only consumed when there is a genuine
    /// choice to make (queue length > 1), so a single-task queue never
    /// perturbs replay determinism with a no-op draw.
    fn pop_task(&mut self) -> Option<Task> {
        if self.queue.is_empty() {
            return None;
        }
        if self.queue.len() == 1 {
            return self.queue.pop_front();
        }
        let index = self.rng.gen_range(0..self.queue.len());
        self.queue.remove(index)
    }

    fn dispatch(&mut self, send: PendingSend) {
        let Some(handler) = self.blueprint.handler_for(&send.to, &send.message) else {
            warn!(component = %send.to, message = %send.message, "no handler for message, dropping");
            return;
        };

        let event_id = id::generate_id(&mut self.rng, "evt");
        trace!(event_id = %event_id, component = %send.to, message = %send.message, "dispatching handler");

        let mut trigger = Row::new();
        trigger.insert("sender".to_string(), Value::Str(send.to.clone()));
        trigger.insert("message".to_string(), Value::Str(send.message.clone()));
        trigger.insert(
            "timestamp".to_string(),
            Value::Str(chrono::Utc::now().to_rfc3339()),
        );
        trigger.insert("payload".to_string(), Value::Map(send.payload.clone()));

        self.log.append(Event {
            event_id: event_id.clone(),
            sequence: 0,
            timestamp: chrono::Utc::now(),
            correlation_id: send.correlation_id.clone(),
            causation_id: send.causation_id,
            component: send.to.clone(),
            handler_name: Some(send.message.clone()),
            trigger_message: Some(send.message.clone()),
            table_name: None,
            action: EventAction::HandlerExec,
            payload: Value::Map(send.payload.clone()).to_canonical_json(),
            simulation_seed: self.seed,
        });

        self.queue.push_back(Task::Handler(HandlerTask {
            component: send.to,
            handler_name: handler.on_message.clone(),
            steps: handler.logic.iter().cloned().collect(),
            trigger,
            read_bindings: Row::new(),
            event_id,
            correlation_id: send.correlation_id,
        }));
    }

    fn build_context(&self, task: &HandlerTask) -> MapContext {
        let msg = task
            .trigger
            .get("payload")
            .cloned()
            .unwrap_or(Value::Map(Row::new()));
        MapContext::new()
            .with("trigger", Value::Map(task.trigger.clone()))
            .with("msg", msg)
            .with("read", Value::Map(task.read_bindings.clone()))
    }

    fn render_row(&self, row: &Row, ctx: &dyn Context) -> Row {
        row.iter()
            .map(|(column, value)| (column.clone(), self.render_value(value, ctx)))
            .collect()
    }

    fn render_value(&self, value: &Value, ctx: &dyn Context) -> Value {
        match value {
            Value::Str(s) => self.engine.render_template(s, ctx),
            other => other.clone(),
        }
    }

    fn execute_step(&mut self, task: &mut HandlerTask, step: Step) {
        let ctx = self.build_context(task);
        match step {
            Step::Read { table, where_, key, as_ } => {
                let mut predicate = where_.map(|w| self.render_row(&w, &ctx)).unwrap_or_default();
                if let Some(key_value) = key {
                    let rendered_key = self.render_value(&key_value, &ctx);
                    match self.blueprint.table_schema(&table).and_then(|schema| schema.primary_key()) {
                        Some(pk) => {
                            predicate.insert(pk.name.clone(), rendered_key);
                        }
                        None => warn!(table, "read.key given but table declares no primary key, ignoring"),
                    }
                }
                let found = self.store.read(&task.component, &table, &predicate);
                task.read_bindings
                    .insert(as_, found.map(Value::Map).unwrap_or(Value::Null));
            }
            Step::Create { table, data } => {
                let resolved = self.render_row(&data, &ctx);
                match self.store.write(&task.component, &table, WriteKind::Create, resolved, None) {
                    Ok(outcome) => self.log_write(task, &table, EventAction::Create, &outcome.rows, &outcome.owner_component),
                    Err(e) => warn!(error = %e, table, "create rejected"),
                }
            }
            Step::Update { table, set, where_ } => {
                let resolved_set = self.render_row(&set, &ctx);
                let resolved_where = self.render_row(&where_, &ctx);
                match self
                    .store
                    .write(&task.component, &table, WriteKind::Update, resolved_set, Some(resolved_where))
                {
                    Ok(outcome) => self.log_write(task, &table, EventAction::Update, &outcome.rows, &outcome.owner_component),
                    Err(e) => warn!(error = %e, table, "update rejected"),
                }
            }
            Step::Send { to, message, payload } => {
                let resolved_payload = self.render_row(&payload, &ctx);
                if let Some((target, probability)) = self.roll_faults(&to) {
                    let fault_id = id::generate_id(&mut self.rng, "flt");
                    debug!(target, probability, "fault injection dropped send");
                    self.log.append(Event {
                        event_id: fault_id,
                        sequence: 0,
                        timestamp: chrono::Utc::now(),
                        correlation_id: task.correlation_id.clone(),
                        causation_id: Some(task.event_id.clone()),
                        component: target,
                        handler_name: None,
                        trigger_message: Some(message),
                        table_name: None,
                        action: EventAction::FaultInjection,
                        payload: serde_json::json!({ "probability": probability }),
                        simulation_seed: self.seed,
                    });
                    return;
                }
                self.queue.push_back(Task::Dispatch(PendingSend {
                    to,
                    message,
                    payload: resolved_payload,
                    correlation_id: task.correlation_id.clone(),
                    causation_id: Some(task.event_id.clone()),
                }));
            }
            Step::Match { on, cases } => {
                let actual = self.engine.eval(&on, &ctx);
                for case in cases {
                    let matched = match &case.when {
                        Some(expected) => values_equal(&actual, expected),
                        None => true,
                    };
                    if matched {
                        for new_step in case.steps.into_iter().rev() {
                            task.steps.push_front(new_step);
                        }
                        break;
                    }
                }
            }
        }
    }

    fn log_write(&mut self, task: &HandlerTask, table: &str, action: EventAction, rows: &[Row], owner: &str) {
        if rows.is_empty() {
            return;
        }
        let event_id = id::generate_id(&mut self.rng, "evt");
        self.log.append(Event {
            event_id,
            sequence: 0,
            timestamp: chrono::Utc::now(),
            correlation_id: task.correlation_id.clone(),
            causation_id: Some(task.event_id.clone()),
            component: owner.to_string(),
            handler_name: Some(task.handler_name.clone()),
            trigger_message: Some(task.handler_name.clone()),
            table_name: Some(table.to_string()),
            action,
            payload: Value::List(rows.iter().cloned().map(Value::Map).collect()).to_canonical_json(),
            simulation_seed: self.seed,
        });
    }

    /// Checks every fault matching `to` in declared order, consuming one
    /// RNG draw per fault checked regardless of outcome (`spec.md` §4.5),
    /// and returns the first one that fires.
    fn roll_faults(&mut self, to: &str) -> Option<(String, f64)> {
        for fault in &self.blueprint.run.faults.clone() {
            let Fault::MessageDrop { target, probability } = fault;
            if target == to || target == "*" {
                let roll: f64 = self.rng.gen();
                if roll < *probability {
                    return Some((target.clone(), *probability));
                }
            }
        }
        None
    }

    /// Evaluates every component's invariants against current state,
    /// logging an `INVARIANT_FAIL` event for each one that comes back
    /// falsy. Returns the name of the first failure if `strict` is set
    /// (signalling the run should halt); invariants are still all
    /// evaluated and logged even when not strict.
    fn check_invariants(&mut self, strict: bool) -> Option<String> {
        let root = self.store.root_view();
        let mut first_failure = None;
        for component in &self.blueprint.components.clone() {
            for invariant in &component.invariants {
                let ctx = RootContext::new(root.clone());
                let value = self.engine.eval(&invariant.expression, &ctx);
                if !value.truthy() {
                    let fail_id = id::generate_id(&mut self.rng, "fail");
                    warn!(invariant = %invariant.name, component = %component.name, "invariant failed");
                    self.log.append(Event {
                        event_id: fail_id,
                        sequence: 0,
                        timestamp: chrono::Utc::now(),
                        correlation_id: self.system_correlation_id.clone(),
                        causation_id: None,
                        component: component.name.clone(),
                        handler_name: None,
                        trigger_message: None,
                        table_name: None,
                        action: EventAction::InvariantFail,
                        payload: serde_json::json!({ "invariant": invariant.name }),
                        simulation_seed: self.seed,
                    });
                    if first_failure.is_none() {
                        first_failure = Some(invariant.name.clone());
                    }
                }
            }
        }
        if strict {
            first_failure
        } else {
            None
        }
    }
}

/// Equality used by `match` step dispatch: `Null`/`Unresolved` are one
/// bucket and cross-type numeric comparison is allowed, mirroring the
/// expression engine's own `==` semantics so a `match` case behaves the way
/// the equivalent `{{ on == when }}` expression would.
fn values_equal(a: &Value, b: &Value) -> bool {
    let null_like = |v: &Value| matches!(v, Value::Null | Value::Unresolved);
    if null_like(a) || null_like(b) {
        return null_like(a) && null_like(b);
    }
    let as_f64 = |v: &Value| match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match (a, b) {
        (Value::Int(_) | Value::Float(_) | Value::Bool(_), Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            as_f64(a) == as_f64(b)
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::{
        Component, ExternalSend, Handler, InitialStateEntry, Invariant, RunConfig, Scenario, TableSchema, TestInvariant,
    };

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn counter_blueprint() -> Arc<Blueprint> {
        Arc::new(Blueprint {
            components: vec![Component {
                name: "Counter".into(),
                tables: vec![TableSchema { name: "count".into(), columns: vec![] }],
                handlers: vec![Handler {
                    on_message: "Bump".into(),
                    logic: vec![Step::Create {
                        table: "count".into(),
                        data: row(&[("id", Value::Str("only".into())), ("v", Value::Int(1))]),
                    }],
                }],
                invariants: vec![],
                message_schemas: vec![],
            }],
            scenarios: vec![Scenario {
                name: "bump_once".into(),
                initial_state: vec![],
                sends: vec![ExternalSend {
                    to: "Counter".into(),
                    message: "Bump".into(),
                    payload: Row::new(),
                }],
            }],
            test_invariants: vec![],
            run: RunConfig::default(),
        })
    }

    #[test]
    fn run_completes_and_creates_row() {
        let kernel = Kernel::new(counter_blueprint(), 1).unwrap();
        let report = kernel.run("bump_once").unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        let rows = report.final_state.get(&("Counter".to_string(), "count".to_string())).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn same_seed_is_deterministic() {
        let a = Kernel::new(counter_blueprint(), 42).unwrap().run("bump_once").unwrap();
        let b = Kernel::new(counter_blueprint(), 42).unwrap().run("bump_once").unwrap();
        assert_eq!(a.events.len(), b.events.len());
        for (ea, eb) in a.events.iter().zip(b.events.iter()) {
            assert_eq!(ea.event_id, eb.event_id);
        }
    }

    #[test]
    fn unknown_scenario_is_rejected() {
        let kernel = Kernel::new(counter_blueprint(), 1).unwrap();
        assert!(matches!(kernel.run("missing"), Err(KernelError::UnknownScenario(_))));
    }

    #[test]
    fn analysis_failure_prevents_construction() {
        let mut bp = (*counter_blueprint()).clone();
        bp.components[0].handlers[0].logic = vec![Step::Create {
            table: "count".into(),
            data: row(&[("v", Value::Str("{{ trigger.payload.undeclared.deep }}".into()))]),
        }];
        bp.components[0].message_schemas.push(weave_types::MessageSchema {
            message_name: "Bump".into(),
            fields: vec!["known".into()],
        });
        let result = Kernel::new(Arc::new(bp), 1);
        assert!(matches!(result, Err(KernelError::Analysis(_))));
    }

    #[test]
    fn strict_invariant_failure_halts_run() {
        let mut bp = (*counter_blueprint()).clone();
        bp.components[0].invariants.push(Invariant {
            name: "always_false".into(),
            expression: "false".into(),
        });
        let kernel = Kernel::new(Arc::new(bp), 1).unwrap();
        let report = kernel.run("bump_once").unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::InvariantFailed { invariant: "always_false".into() }
        );
        assert!(report.events.iter().any(|e| e.action == EventAction::InvariantFail));
    }

    #[test]
    fn fault_injection_drops_send_and_logs_event() {
        let mut bp = (*counter_blueprint()).clone();
        bp.components.push(Component {
            name: "Relay".into(),
            tables: vec![],
            handlers: vec![Handler {
                on_message: "Ping".into(),
                logic: vec![Step::Send {
                    to: "Counter".into(),
                    message: "Bump".into(),
                    payload: Row::new(),
                }],
            }],
            invariants: vec![],
            message_schemas: vec![],
        });
        bp.scenarios[0].sends = vec![ExternalSend {
            to: "Relay".into(),
            message: "Ping".into(),
            payload: Row::new(),
        }];
        bp.run.faults.push(Fault::MessageDrop { target: "Counter".into(), probability: 1.0 });

        let kernel = Kernel::new(Arc::new(bp), 1).unwrap();
        let report = kernel.run("bump_once").unwrap();
        assert!(report.events.iter().any(|e| e.action == EventAction::FaultInjection));
        assert!(report.final_state.get(&("Counter".to_string(), "count".to_string())).is_none());
    }

    #[test]
    fn initial_state_is_seeded_before_sends() {
        let mut bp = (*counter_blueprint()).clone();
        bp.scenarios[0].initial_state.push(InitialStateEntry {
            component: "Counter".into(),
            table: "count".into(),
            rows: vec![row(&[("id", Value::Str("seed".into())), ("v", Value::Int(0))])],
        });
        let kernel = Kernel::new(Arc::new(bp), 1).unwrap();
        let report = kernel.run("bump_once").unwrap();
        let rows = report.final_state.get(&("Counter".to_string(), "count".to_string())).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn event_cap_halts_infinite_loop() {
        let mut bp = (*counter_blueprint()).clone();
        bp.components[0].handlers[0].logic = vec![Step::Send {
            to: "Counter".into(),
            message: "Bump".into(),
            payload: Row::new(),
        }];
        bp.run.max_events = 5;
        let max_events = bp.run.max_events;
        let kernel = Kernel::new(Arc::new(bp), 1).unwrap();
        let report = kernel.run("bump_once").unwrap();
        assert_eq!(report.outcome, RunOutcome::EventCapReached);
        assert!(report.events.len() as u64 >= max_events);
    }

    #[test]
    fn read_by_key_resolves_against_primary_key_column() {
        let bp = Arc::new(Blueprint {
            components: vec![Component {
                name: "Accounts".into(),
                tables: vec![TableSchema {
                    name: "account".into(),
                    columns: vec![
                        weave_types::ColumnDef {
                            name: "id".into(),
                            ty: weave_types::PrimitiveType::String,
                            primary_key: true,
                            not_null: true,
                        },
                        weave_types::ColumnDef {
                            name: "balance".into(),
                            ty: weave_types::PrimitiveType::Int,
                            primary_key: false,
                            not_null: true,
                        },
                    ],
                }],
                handlers: vec![Handler {
                    on_message: "Lookup".into(),
                    logic: vec![
                        Step::Read {
                            table: "account".into(),
                            where_: None,
                            key: Some(Value::Str("{{ trigger.payload.id }}".into())),
                            as_: "acct".into(),
                        },
                        Step::Create {
                            table: "account".into(),
                            data: row(&[
                                ("id", Value::Str("found".into())),
                                ("balance", Value::Str("{{ read.acct.balance }}".into())),
                            ]),
                        },
                    ],
                }],
                invariants: vec![],
                message_schemas: vec![],
            }],
            scenarios: vec![Scenario {
                name: "lookup".into(),
                initial_state: vec![InitialStateEntry {
                    component: "Accounts".into(),
                    table: "account".into(),
                    rows: vec![row(&[("id", Value::Str("a".into())), ("balance", Value::Int(77))])],
                }],
                sends: vec![ExternalSend {
                    to: "Accounts".into(),
                    message: "Lookup".into(),
                    payload: row(&[("id", Value::Str("a".into()))]),
                }],
            }],
            test_invariants: vec![],
            run: RunConfig::default(),
        });

        let report = Kernel::new(bp, 1).unwrap().run("lookup").unwrap();
        let rows = report.final_state.get(&("Accounts".to_string(), "account".to_string())).unwrap();
        let found = rows.iter().find(|r| r.get("id") == Some(&Value::Str("found".into()))).unwrap();
        assert_eq!(found.get("balance"), Some(&Value::Int(77)));
    }

    #[test]
    fn unreferenced_test_invariants_field_round_trips() {
        // `test_invariants` is consumed by weave-chaos, not the kernel;
        // confirm the kernel tolerates it being present without effect.
        let mut bp = (*counter_blueprint()).clone();
        bp.test_invariants.push(TestInvariant::Builtin { name: "total_balance_conserved".into() });
        let kernel = Kernel::new(Arc::new(bp), 1).unwrap();
        assert!(kernel.run("bump_once").is_ok());
    }
}
