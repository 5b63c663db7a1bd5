//! Event types for the conversation log.
//!
//! Every observable fact about a conversation is an immutable [`Event`]
//! appended to its log: prompts, messages, proposed actions, tool
//! observations, errors, pauses, rejections, and condensation summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use colloquy_tooling::FINISH_TOOL_NAME;

use crate::security::SecurityRisk;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Origin of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    /// The human user.
    User,
    /// The agent (model-driven).
    Agent,
    /// The engine itself (tool results, pauses, rejections).
    Environment,
}

/// A proposed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Name of the tool to invoke.
    pub tool_name: String,
    /// Validated arguments for the tool.
    pub arguments: Value,
    /// Security risk assigned at gating time.
    pub risk: SecurityRisk,
    /// Correlation id from the model's tool call.
    pub call_id: String,
}

impl ActionEvent {
    /// Returns true if this action is the terminal `finish` tool.
    #[must_use]
    pub fn is_finish(&self) -> bool {
        self.tool_name == FINISH_TOOL_NAME
    }
}

/// The result of executing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationEvent {
    /// Id of the action event this observation answers.
    pub action_id: EventId,
    /// Tool output, already masked for secrets.
    pub content: String,
    /// Whether the tool reported success.
    pub success: bool,
}

/// An agent-level failure, possibly tied to a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentErrorEvent {
    /// Id of the action that failed, if the error answers one.
    pub action_id: Option<EventId>,
    /// Human-readable error description.
    pub message: String,
}

/// A user rejection of a pending action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionEvent {
    /// Id of the rejected action event.
    pub action_id: EventId,
    /// Why the action was rejected.
    pub reason: String,
}

/// Variant-specific payload of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The system prompt seeding the conversation.
    SystemPrompt {
        /// Prompt text.
        content: String,
    },
    /// A plain message; [`Event::source`] says whether user or agent wrote it.
    Message {
        /// Message text.
        content: String,
    },
    /// A proposed tool invocation.
    Action(ActionEvent),
    /// The result of executing an action.
    Observation(ObservationEvent),
    /// An agent-level failure.
    AgentError(AgentErrorEvent),
    /// A cooperative pause took effect.
    Pause,
    /// A summary replacing condensed history.
    CondensationSummary {
        /// Summary text.
        summary: String,
    },
    /// A user rejection of a pending action.
    Rejection(RejectionEvent),
}

/// An immutable, ordered record in a conversation's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,
    /// Who produced the event.
    pub source: EventSource,
    /// Position in the log, assigned on append.
    pub seq: u64,
    /// Creation time (volatile; excluded from structural comparison).
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event with a fresh id and the current timestamp.
    ///
    /// The sequence number is assigned when the event is appended to a log.
    #[must_use]
    pub fn new(source: EventSource, kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            source,
            seq: 0,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Creates a system prompt event.
    #[must_use]
    pub fn system_prompt<T: Into<String>>(content: T) -> Self {
        Self::new(
            EventSource::Environment,
            EventKind::SystemPrompt {
                content: content.into(),
            },
        )
    }

    /// Creates a user message event.
    #[must_use]
    pub fn user_message<T: Into<String>>(content: T) -> Self {
        Self::new(
            EventSource::User,
            EventKind::Message {
                content: content.into(),
            },
        )
    }

    /// Creates an agent message event.
    #[must_use]
    pub fn agent_message<T: Into<String>>(content: T) -> Self {
        Self::new(
            EventSource::Agent,
            EventKind::Message {
                content: content.into(),
            },
        )
    }

    /// Creates an action event proposed by the agent.
    #[must_use]
    pub fn action(action: ActionEvent) -> Self {
        Self::new(EventSource::Agent, EventKind::Action(action))
    }

    /// Creates an observation event answering an action.
    #[must_use]
    pub fn observation(observation: ObservationEvent) -> Self {
        Self::new(EventSource::Environment, EventKind::Observation(observation))
    }

    /// Creates an agent error event.
    #[must_use]
    pub fn agent_error<T: Into<String>>(action_id: Option<EventId>, message: T) -> Self {
        Self::new(
            EventSource::Environment,
            EventKind::AgentError(AgentErrorEvent {
                action_id,
                message: message.into(),
            }),
        )
    }

    /// Creates a pause event.
    #[must_use]
    pub fn pause() -> Self {
        Self::new(EventSource::Environment, EventKind::Pause)
    }

    /// Creates a condensation summary event.
    #[must_use]
    pub fn condensation_summary<T: Into<String>>(summary: T) -> Self {
        Self::new(
            EventSource::Environment,
            EventKind::CondensationSummary {
                summary: summary.into(),
            },
        )
    }

    /// Creates a rejection event answering an action.
    #[must_use]
    pub fn rejection<T: Into<String>>(action_id: EventId, reason: T) -> Self {
        Self::new(
            EventSource::User,
            EventKind::Rejection(RejectionEvent {
                action_id,
                reason: reason.into(),
            }),
        )
    }

    /// Returns true if this is a user-authored message event.
    #[must_use]
    pub fn is_user_message(&self) -> bool {
        self.source == EventSource::User && matches!(self.kind, EventKind::Message { .. })
    }

    /// Returns true if this is an agent-authored message event.
    #[must_use]
    pub fn is_agent_message(&self) -> bool {
        self.source == EventSource::Agent && matches!(self.kind, EventKind::Message { .. })
    }

    /// Returns the action payload if this is an action event.
    #[must_use]
    pub fn as_action(&self) -> Option<&ActionEvent> {
        match &self.kind {
            EventKind::Action(action) => Some(action),
            _ => None,
        }
    }

    /// Returns the observation payload if this is an observation event.
    #[must_use]
    pub fn as_observation(&self) -> Option<&ObservationEvent> {
        match &self.kind {
            EventKind::Observation(observation) => Some(observation),
            _ => None,
        }
    }

    /// Structural equality ignoring volatile fields.
    ///
    /// Ids, sequence numbers, timestamps, correlation ids, and answered
    /// action ids are excluded; everything else is deep value equality.
    /// Used by the stuck detector to spot repeated behavior across turns.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (EventKind::Action(left), EventKind::Action(right)) => {
                left.tool_name == right.tool_name && left.arguments == right.arguments
            }
            (EventKind::Observation(left), EventKind::Observation(right)) => {
                left.content == right.content && left.success == right.success
            }
            (EventKind::AgentError(left), EventKind::AgentError(right)) => {
                left.message == right.message
            }
            (EventKind::Message { content: left }, EventKind::Message { content: right }) => {
                self.source == other.source && left == right
            }
            (left, right) => left == right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_action(command: &str) -> Event {
        Event::action(ActionEvent {
            tool_name: "execute_bash".to_owned(),
            arguments: json!({"command": command}),
            risk: SecurityRisk::Unknown,
            call_id: "call-1".to_owned(),
        })
    }

    #[test]
    fn test_same_shape_ignores_ids_and_call_ids() {
        let first = sample_action("ls");
        let mut second = sample_action("ls");
        if let EventKind::Action(action) = &mut second.kind {
            action.call_id = "call-2".to_owned();
        }

        assert_ne!(first.id, second.id);
        assert!(first.same_shape(&second));
    }

    #[test]
    fn test_same_shape_differs_on_arguments() {
        let first = sample_action("ls");
        let second = sample_action("pwd");
        assert!(!first.same_shape(&second));
    }

    #[test]
    fn test_same_shape_observations_ignore_action_id() {
        let first = Event::observation(ObservationEvent {
            action_id: EventId::new(),
            content: "ok".to_owned(),
            success: true,
        });
        let second = Event::observation(ObservationEvent {
            action_id: EventId::new(),
            content: "ok".to_owned(),
            success: true,
        });
        assert!(first.same_shape(&second));
    }

    #[test]
    fn test_message_shape_includes_source() {
        let user = Event::user_message("hello");
        let agent = Event::agent_message("hello");
        assert!(!user.same_shape(&agent));
        assert!(user.same_shape(&Event::user_message("hello")));
    }

    #[test]
    fn test_is_finish() {
        let finish = ActionEvent {
            tool_name: FINISH_TOOL_NAME.to_owned(),
            arguments: json!({}),
            risk: SecurityRisk::Unknown,
            call_id: "call-9".to_owned(),
        };
        assert!(finish.is_finish());

        let other = ActionEvent {
            tool_name: "execute_bash".to_owned(),
            arguments: json!({}),
            risk: SecurityRisk::Unknown,
            call_id: "call-9".to_owned(),
        };
        assert!(!other.is_finish());
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = sample_action("echo hi");
        let json = serde_json::to_string(&event);
        assert!(json.is_ok());
        if let Ok(json) = json {
            let parsed: Result<Event, _> = serde_json::from_str(&json);
            assert!(parsed.is_ok());
            if let Ok(parsed) = parsed {
                assert_eq!(parsed.id, event.id);
                assert!(parsed.same_shape(&event));
            }
        }
    }
}
