//! Scheduler queue entries.
//!
//! `spec.md` §4.5: a task queue holds two kinds of work. A [`PendingSend`]
//! is a message waiting to be dispatched to a handler; once dispatched it
//! becomes a single [`HandlerTask`] carrying the handler's *entire* step
//! list — the same task object cycles back through the queue, one step
//! executed per scheduling pick, rather than being split into one queue
//! entry per step.

use std::collections::VecDeque;

use weave_types::{Row, Step};

/// A message en route to a handler, not yet dispatched.
#[derive(Debug, Clone)]
pub(crate) struct PendingSend {
    pub to: String,
    pub message: String,
    pub payload: Row,
    pub correlation_id: String,
    pub causation_id: Option<String>,
}

/// One handler invocation in progress: its remaining steps and the
/// evaluation context accumulated so far (`trigger`, `msg`, and any
/// `read.<alias>` bindings).
#[derive(Debug, Clone)]
pub(crate) struct HandlerTask {
    pub component: String,
    pub handler_name: String,
    pub steps: VecDeque<Step>,
    pub trigger: Row,
    pub read_bindings: Row,
    pub event_id: String,
    pub correlation_id: String,
}

/// One entry in the scheduler's queue.
#[derive(Debug, Clone)]
pub(crate) enum Task {
    /// A send awaiting handler dispatch.
    Dispatch(PendingSend),
    /// A handler invocation with steps still to execute.
    Handler(HandlerTask),
}
