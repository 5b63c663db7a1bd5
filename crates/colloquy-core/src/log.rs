//! Append-only event log.
//!
//! The log is the single source of truth for a conversation: events are
//! appended in the order the single-writer loop observed them and are never
//! mutated, reordered, or removed afterwards.

use crate::event::{ActionEvent, Event, EventId, EventKind};

/// Append-only, order-preserving sequence of events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Appends an event, assigning its sequence number.
    ///
    /// This is the only mutator the log exposes.
    pub fn append(&mut self, mut event: Event) -> &Event {
        let index = self.events.len();
        event.seq = index as u64;
        self.events.push(event);
        &self.events[index]
    }

    /// Number of events in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Borrow the event at the given position.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    /// Borrow the last `count` events (fewer if the log is shorter).
    #[must_use]
    pub fn last_n(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }

    /// Iterate over all events in order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Borrow all events as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }

    /// Borrow the events after the most recent user message.
    ///
    /// Returns the whole log if no user message exists. The boundary
    /// message itself is excluded.
    #[must_use]
    pub fn tail_after_user_message(&self) -> &[Event] {
        let boundary = self
            .events
            .iter()
            .rposition(Event::is_user_message)
            .map_or(0, |position| position + 1);
        &self.events[boundary..]
    }

    /// Iterate over action events with their ids, in order.
    pub fn actions(&self) -> impl Iterator<Item = (EventId, &ActionEvent)> {
        self.events.iter().filter_map(|event| match &event.kind {
            EventKind::Action(action) => Some((event.id, action)),
            _ => None,
        })
    }

    /// Find the event answering the given action, if any.
    ///
    /// An action is answered by an observation, an agent error carrying its
    /// id, or a rejection.
    #[must_use]
    pub fn result_for(&self, action_id: EventId) -> Option<&Event> {
        self.events.iter().find(|event| match &event.kind {
            EventKind::Observation(observation) => observation.action_id == action_id,
            EventKind::AgentError(error) => error.action_id == Some(action_id),
            EventKind::Rejection(rejection) => rejection.action_id == action_id,
            _ => false,
        })
    }

    /// Actions that have not been answered yet (pending confirmation).
    #[must_use]
    pub fn unmatched_actions(&self) -> Vec<(EventId, &ActionEvent)> {
        self.actions()
            .filter(|(action_id, _)| self.result_for(*action_id).is_none())
            .collect()
    }
}
