#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **weave-eventlog** – append-only causal event log for one run (C3).
//!
//! One [`EventLog`] is created at run start, populated monotonically by
//! the kernel, and closed at run end (`spec.md` §3, §4.3). It is the
//! source of truth: the state store is reconstructible by replaying every
//! `CREATE`/`UPDATE`/`DELETE` event in sequence order (`spec.md` §8).

use weave_types::{Event, EventAction, EventId, SimulationMetadata};

/// Inclusive sequence-number range used by [`ReadFilter::sequence_range`].
/// Stands in for "time range" per `spec.md` §4.3, since wall-clock time is
/// display-only (§4.5) and sequence number is the true ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRange {
    /// Inclusive lower bound.
    pub start: u64,
    /// Inclusive upper bound.
    pub end: u64,
}

/// Filter predicate for [`EventLog::read_all`]. Every populated field is
/// ANDed together; an empty filter matches every event.
#[derive(Debug, Clone, Default)]
pub struct ReadFilter {
    /// Match only events sharing this correlation id.
    pub correlation_id: Option<String>,
    /// Match only events attributed to this component.
    pub component: Option<String>,
    /// Match only events carrying this action.
    pub action: Option<EventAction>,
    /// Match only events whose sequence number falls in this range.
    pub sequence_range: Option<SequenceRange>,
}

impl ReadFilter {
    /// Filter matching every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Restrict to one component.
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Restrict to one action kind.
    pub fn with_action(mut self, action: EventAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Restrict to an inclusive sequence-number range.
    pub fn with_sequence_range(mut self, start: u64, end: u64) -> Self {
        self.sequence_range = Some(SequenceRange { start, end });
        self
    }

    fn matches(&self, event: &Event) -> bool {
        if let Some(cid) = &self.correlation_id {
            if &event.correlation_id != cid {
                return false;
            }
        }
        if let Some(component) = &self.component {
            if &event.component != component {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &event.action != action {
                return false;
            }
        }
        if let Some(range) = &self.sequence_range {
            if event.sequence < range.start || event.sequence > range.end {
                return false;
            }
        }
        true
    }
}

/// Append-only, per-run causal event log plus its sibling metadata record.
///
/// Atomicity contract (`spec.md` §4.3): a single handler step that performs
/// one write records exactly one log event; from the perspective of
/// invariant evaluation the state mutation and this append are a single
/// atomic unit — callers achieve that by calling [`EventLog::append`] and
/// applying the corresponding state-store write inside the same handler
/// step, before any other task is scheduled.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    metadata: SimulationMetadata,
}

impl EventLog {
    /// Opens a new, empty log for `simulation_seed` running `scenario_name`,
    /// stamping the metadata's start timestamp at `now`.
    pub fn open(
        simulation_seed: u64,
        scenario_name: impl Into<String>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            events: Vec::new(),
            metadata: SimulationMetadata {
                simulation_seed,
                scenario_name: scenario_name.into(),
                start_timestamp: now,
                end_timestamp: now,
                event_count: 0,
            },
        }
    }

    /// Appends `event` to the log, assigning it the next monotonically
    /// increasing sequence number. The `sequence` field of `event` is
    /// overwritten unconditionally — callers never choose it themselves.
    ///
    /// Returns the assigned sequence number.
    pub fn append(&mut self, mut event: Event) -> u64 {
        let sequence = self.events.len() as u64;
        event.sequence = sequence;
        tracing::trace!(
            sequence,
            event_id = %event.event_id,
            action = ?event.action,
            component = %event.component,
            "event appended"
        );
        self.events.push(event);
        self.metadata.event_count = self.events.len() as u64;
        sequence
    }

    /// Returns every event matching `filter`, in sequence order.
    pub fn read_all(&self, filter: &ReadFilter) -> Vec<&Event> {
        self.events.iter().filter(|e| filter.matches(e)).collect()
    }

    /// Total number of events appended so far.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True if no events have been appended.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Looks up one event by id, scanning in sequence order. Used by the
    /// causal-chain invariant check (`spec.md` §8): every non-root event's
    /// `causation_id` must reference an earlier-sequenced event sharing its
    /// `correlation_id`.
    pub fn find(&self, event_id: &EventId) -> Option<&Event> {
        self.events.iter().find(|e| &e.event_id == event_id)
    }

    /// Closes the log, stamping the metadata's end timestamp and final
    /// event count, and returns both halves for the caller to persist or
    /// inspect.
    pub fn close(mut self, now: chrono::DateTime<chrono::Utc>) -> (Vec<Event>, SimulationMetadata) {
        self.metadata.end_timestamp = now;
        self.metadata.event_count = self.events.len() as u64;
        (self.events, self.metadata)
    }

    /// Read-only view of the metadata record as it stands so far (end
    /// timestamp and event count are only final after [`EventLog::close`]).
    pub fn metadata(&self) -> &SimulationMetadata {
        &self.metadata
    }

    /// Checks the causal-chain invariant (`spec.md` §8) for every event in
    /// the log: every event with a non-null `causation_id` must reference
    /// an earlier-sequenced event sharing its `correlation_id`. Returns the
    /// offending event ids, if any.
    pub fn validate_causal_chain(&self) -> Vec<EventId> {
        let mut violations = Vec::new();
        for event in &self.events {
            let Some(parent_id) = &event.causation_id else {
                continue;
            };
            let parent = self.events.iter().find(|p| &p.event_id == parent_id);
            let valid = matches!(
                parent,
                Some(parent)
                    if parent.correlation_id == event.correlation_id
                        && parent.sequence < event.sequence
            );
            if !valid {
                violations.push(event.event_id.clone());
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::EventAction;

    fn sample_event(component: &str, action: EventAction, correlation_id: &str) -> Event {
        Event {
            event_id: format!("evt_{component}_{:?}", action),
            sequence: 0,
            timestamp: chrono::Utc::now(),
            correlation_id: correlation_id.to_string(),
            causation_id: None,
            component: component.to_string(),
            handler_name: None,
            trigger_message: None,
            table_name: None,
            action,
            payload: serde_json::Value::Null,
            simulation_seed: 1,
        }
    }

    #[test]
    fn append_assigns_monotonic_sequence() {
        let mut log = EventLog::open(1, "scenario", chrono::Utc::now());
        let a = log.append(sample_event("A", EventAction::HandlerExec, "tx1"));
        let b = log.append(sample_event("B", EventAction::Create, "tx1"));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn read_all_filters_by_correlation_and_action() {
        let mut log = EventLog::open(1, "scenario", chrono::Utc::now());
        log.append(sample_event("A", EventAction::HandlerExec, "tx1"));
        log.append(sample_event("A", EventAction::Create, "tx1"));
        log.append(sample_event("B", EventAction::Create, "tx2"));

        let filter = ReadFilter::all().with_correlation_id("tx1").with_action(EventAction::Create);
        let results = log.read_all(&filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].component, "A");
    }

    #[test]
    fn close_stamps_metadata() {
        let mut log = EventLog::open(42, "scenario", chrono::Utc::now());
        log.append(sample_event("A", EventAction::HandlerExec, "tx1"));
        let (events, metadata) = log.close(chrono::Utc::now());
        assert_eq!(events.len(), 1);
        assert_eq!(metadata.simulation_seed, 42);
        assert_eq!(metadata.event_count, 1);
    }

    #[test]
    fn validate_causal_chain_detects_dangling_causation() {
        let mut log = EventLog::open(1, "scenario", chrono::Utc::now());
        let mut child = sample_event("B", EventAction::Create, "tx1");
        child.causation_id = Some("missing".to_string());
        log.append(child);
        let violations = log.validate_causal_chain();
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn validate_causal_chain_accepts_valid_parent() {
        let mut log = EventLog::open(1, "scenario", chrono::Utc::now());
        let parent_seq_event = sample_event("A", EventAction::HandlerExec, "tx1");
        let parent_id = parent_seq_event.event_id.clone();
        log.append(parent_seq_event);

        let mut child = sample_event("B", EventAction::Create, "tx1");
        child.causation_id = Some(parent_id);
        log.append(child);

        assert!(log.validate_causal_chain().is_empty());
    }
}
