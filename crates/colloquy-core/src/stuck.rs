//! Stuck-loop detection over the event log tail.
//!
//! The detector reads events after the most recent user message and
//! classifies repetitive, unproductive patterns. It is advisory: it only
//! reports a boolean, and the application decides whether to abort.

use tracing::warn;

use crate::event::{Event, EventKind};
use crate::log::EventLog;

/// Minimum post-boundary events before any pattern is evaluated.
const MIN_TAIL_EVENTS: usize = 3;
/// Identical action/observation pairs that count as a loop.
const REPEAT_ACTION_OBSERVATION: usize = 4;
/// Identical action/error pairs that count as a loop.
///
/// Deliberately lower than the observation threshold: errors repeat less
/// often by accident.
const REPEAT_ACTION_ERROR: usize = 3;
/// Consecutive agent messages that count as a monologue.
const MONOLOGUE_LENGTH: usize = 3;
/// Events inspected for the alternating ping-pong pattern.
const PING_PONG_WINDOW: usize = 6;
/// Minimum tail length before the context-window-error check applies.
const CONTEXT_WINDOW_ERROR_MIN_EVENTS: usize = 10;

/// Detects repetitive, unproductive behavior in recent turns.
#[derive(Debug, Clone, Copy, Default)]
pub struct StuckDetector;

impl StuckDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classifies the log tail; true means the agent looks stuck.
    ///
    /// Requires at least three events after the most recent user message;
    /// with fewer, the agent is never considered stuck. The five pattern
    /// checks run in order and any match reports stuck.
    #[must_use]
    pub fn is_stuck(&self, log: &EventLog) -> bool {
        let tail = log.tail_after_user_message();
        if tail.len() < MIN_TAIL_EVENTS {
            return false;
        }

        if Self::repeating_action_observation(tail) {
            warn!("stuck: repeating action/observation loop");
            return true;
        }
        if Self::repeating_action_error(tail) {
            warn!("stuck: repeating action/error loop");
            return true;
        }
        if Self::agent_monologue(tail) {
            warn!("stuck: agent monologue");
            return true;
        }
        if Self::alternating_ping_pong(tail) {
            warn!("stuck: alternating action/observation ping-pong");
            return true;
        }
        if tail.len() >= CONTEXT_WINDOW_ERROR_MIN_EVENTS
            && Self::repeated_context_window_errors(tail)
        {
            warn!("stuck: repeated context window errors");
            return true;
        }
        false
    }

    /// Last four actions identical and last four observations identical.
    fn repeating_action_observation(tail: &[Event]) -> bool {
        let actions = events_of(tail, |kind| matches!(kind, EventKind::Action(_)));
        let observations = events_of(tail, |kind| matches!(kind, EventKind::Observation(_)));

        all_same_shape(last(&actions, REPEAT_ACTION_OBSERVATION))
            && all_same_shape(last(&observations, REPEAT_ACTION_OBSERVATION))
    }

    /// Last three actions identical and each answered by an error event.
    fn repeating_action_error(tail: &[Event]) -> bool {
        let actions = events_of(tail, |kind| matches!(kind, EventKind::Action(_)));
        let recent = last(&actions, REPEAT_ACTION_ERROR);
        if !all_same_shape(recent) {
            return false;
        }

        recent.iter().all(|action| {
            tail.iter().any(|event| {
                matches!(
                    &event.kind,
                    EventKind::AgentError(error) if error.action_id == Some(action.id)
                )
            })
        })
    }

    /// Three or more trailing agent messages with nothing between them.
    ///
    /// Condensation summaries do not break the streak.
    fn agent_monologue(tail: &[Event]) -> bool {
        let mut streak = 0;
        for event in tail.iter().rev() {
            if matches!(event.kind, EventKind::CondensationSummary { .. }) {
                continue;
            }
            if event.is_agent_message() {
                streak += 1;
                if streak >= MONOLOGUE_LENGTH {
                    return true;
                }
            } else {
                break;
            }
        }
        false
    }

    /// Last six actions and observations each alternate A,B,A,B,A,B.
    fn alternating_ping_pong(tail: &[Event]) -> bool {
        if tail.len() < PING_PONG_WINDOW {
            return false;
        }
        let actions = events_of(tail, |kind| matches!(kind, EventKind::Action(_)));
        let observations = events_of(tail, |kind| matches!(kind, EventKind::Observation(_)));

        alternates(last(&actions, PING_PONG_WINDOW))
            && alternates(last(&observations, PING_PONG_WINDOW))
    }

    /// Reserved for a future condenser-error pattern; never matches today.
    fn repeated_context_window_errors(_tail: &[Event]) -> bool {
        false
    }
}

/// Events in the tail whose kind matches the predicate, in order.
fn events_of<'tail>(
    tail: &'tail [Event],
    predicate: impl Fn(&EventKind) -> bool,
) -> Vec<&'tail Event> {
    tail.iter().filter(|event| predicate(&event.kind)).collect()
}

/// The last `count` elements, or an empty slice if there are fewer.
///
/// Returning empty (rather than a shorter prefix) keeps threshold checks
/// honest: a pattern needs its full window to match.
fn last<'win, 'tail>(events: &'win [&'tail Event], count: usize) -> &'win [&'tail Event] {
    if events.len() < count {
        &[]
    } else {
        &events[events.len() - count..]
    }
}

/// True if the window is non-empty and every event matches the first.
fn all_same_shape(window: &[&Event]) -> bool {
    match window.split_first() {
        Some((first, rest)) => rest.iter().all(|event| first.same_shape(event)),
        None => false,
    }
}

/// True for a six-long window alternating between two shapes.
fn alternates(window: &[&Event]) -> bool {
    if window.len() != PING_PONG_WINDOW {
        return false;
    }
    window[0].same_shape(window[2])
        && window[2].same_shape(window[4])
        && window[1].same_shape(window[3])
        && window[3].same_shape(window[5])
}
