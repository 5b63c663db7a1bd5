//! Conversation state and status machine.
//!
//! [`ConversationState`] owns the event log, the agent status, the
//! confirmation policy, and the secrets manager. All mutation happens
//! while holding the exclusive scoped lock exposed by [`SharedState`];
//! the guard is passed down a call chain rather than re-acquired.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::event::Event;
use crate::log::EventLog;
use crate::secrets::SecretsManager;
use crate::security::ConfirmationPolicy;
use crate::sync::IgnoreLock as _;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Creates a new random conversation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Where the agent is in its run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AgentStatus {
    /// Waiting for input; nothing in flight.
    #[default]
    Idle,
    /// The step loop is executing.
    Running,
    /// Proposed actions are pending user approval.
    WaitingForConfirmation,
    /// A cooperative pause took effect.
    Paused,
    /// The agent ended its turn; terminal until a new message arrives.
    Finished,
    /// An unrecoverable error occurred; terminal until a new message arrives.
    Error,
}

impl AgentStatus {
    /// Terminal until a new external input resets the conversation.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Error)
    }

    /// The agent is mid-turn and new messages must queue.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Running | Self::WaitingForConfirmation)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::WaitingForConfirmation => "waiting_for_confirmation",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Error => "error",
        };
        formatter.write_str(name)
    }
}

/// Mutable state owned by a single conversation.
#[derive(Debug)]
pub struct ConversationState {
    id: ConversationId,
    events: EventLog,
    agent_status: AgentStatus,
    confirmation_policy: ConfirmationPolicy,
    secrets: SecretsManager,
    parent_id: Option<ConversationId>,
}

impl ConversationState {
    /// Creates fresh state for a new conversation.
    #[must_use]
    pub fn new(confirmation_policy: ConfirmationPolicy) -> Self {
        Self {
            id: ConversationId::new(),
            events: EventLog::new(),
            agent_status: AgentStatus::Idle,
            confirmation_policy,
            secrets: SecretsManager::new(),
            parent_id: None,
        }
    }

    /// Creates state for a child conversation, weakly linked to a parent.
    ///
    /// The link is identity only: the child shares no mutable state with
    /// its parent.
    #[must_use]
    pub fn with_parent(confirmation_policy: ConfirmationPolicy, parent_id: ConversationId) -> Self {
        let mut state = Self::new(confirmation_policy);
        state.parent_id = Some(parent_id);
        state
    }

    /// This conversation's id.
    #[must_use]
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// The parent conversation's id, if this is a child.
    #[must_use]
    pub fn parent_id(&self) -> Option<ConversationId> {
        self.parent_id
    }

    /// Borrow the event log.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Append an event to the log.
    pub fn append_event(&mut self, event: Event) -> &Event {
        self.events.append(event)
    }

    /// Current agent status.
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        self.agent_status
    }

    /// Transition the agent status.
    pub fn set_status(&mut self, status: AgentStatus) {
        if self.agent_status != status {
            debug!(
                conversation = %self.id,
                from = %self.agent_status,
                to = %status,
                "agent status transition"
            );
            self.agent_status = status;
        }
    }

    /// Current confirmation policy.
    #[must_use]
    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        self.confirmation_policy
    }

    /// Replace the confirmation policy.
    pub fn set_confirmation_policy(&mut self, policy: ConfirmationPolicy) {
        self.confirmation_policy = policy;
    }

    /// Borrow the secrets manager.
    #[must_use]
    pub fn secrets(&self) -> &SecretsManager {
        &self.secrets
    }

    /// Mutably borrow the secrets manager.
    pub fn secrets_mut(&mut self) -> &mut SecretsManager {
        &mut self.secrets
    }
}

/// Shared handle to a conversation's state behind its exclusive lock.
///
/// Cloning the handle shares the same underlying state. The lock is
/// acquired once per call chain and released on every exit path; it is
/// never held across a model or tool await.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<ConversationState>>,
}

impl SharedState {
    /// Wraps state in a shared, lockable handle.
    #[must_use]
    pub fn new(state: ConversationState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Acquire the exclusive scoped lock.
    ///
    /// Blocks if another thread holds it; poisoning is cleared because the
    /// panicking thread's error is the one that matters.
    pub fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.inner.lock_ignore_poison()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_state_defaults() {
        let state = ConversationState::new(ConfirmationPolicy::NeverConfirm);
        assert_eq!(state.status(), AgentStatus::Idle);
        assert!(state.events().is_empty());
        assert!(state.parent_id().is_none());
        assert!(state.secrets().is_empty());
    }

    #[test]
    fn test_with_parent_links_identity_only() {
        let parent = ConversationState::new(ConfirmationPolicy::NeverConfirm);
        let child =
            ConversationState::with_parent(ConfirmationPolicy::AlwaysConfirm, parent.id());

        assert_eq!(child.parent_id(), Some(parent.id()));
        assert_ne!(child.id(), parent.id());
    }

    #[test]
    fn test_status_transitions() {
        let mut state = ConversationState::new(ConfirmationPolicy::NeverConfirm);
        state.set_status(AgentStatus::Running);
        assert_eq!(state.status(), AgentStatus::Running);
        assert!(state.status().is_busy());

        state.set_status(AgentStatus::Finished);
        assert!(state.status().is_terminal());
        assert!(!state.status().is_busy());
    }

    #[test]
    fn test_shared_state_cross_thread_mutation() {
        let shared = SharedState::new(ConversationState::new(ConfirmationPolicy::NeverConfirm));
        let cloned = shared.clone();

        let handle = thread::spawn(move || {
            let mut guard = cloned.lock();
            guard.append_event(Event::user_message("from another thread"));
            guard.set_status(AgentStatus::Running);
        });
        assert!(handle.join().is_ok());

        let guard = shared.lock();
        assert_eq!(guard.events().len(), 1);
        assert_eq!(guard.status(), AgentStatus::Running);
    }
}
