//! Conversation run loop, message queue, pause, and close.
//!
//! A [`Conversation`] owns the shared state and drives [`Agent::step`]
//! until the agent finishes, pauses, or asks for confirmation. Messages
//! sent while the agent is busy queue in FIFO order and drain at the next
//! idle window. Pause is cooperative: the flag is checked between loop
//! iterations, so an in-flight model or tool call completes first.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use colloquy_core::config::EngineConfig;
use colloquy_core::event::{Event, EventId};
use colloquy_core::secrets::SecretSource;
use colloquy_core::security::ConfirmationPolicy;
use colloquy_core::state::{
    AgentStatus, ConversationId, ConversationState, SharedState,
};
use colloquy_core::stuck::StuckDetector;
use colloquy_core::{Error, IgnoreLock as _, Result};

use crate::agent::{Agent, StepContext, StepOutcome};
use crate::registry::ConversationRegistry;
use crate::sink::EventSink;

/// Snapshot of a conversation's message queue and status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationStats {
    /// Messages waiting for the next idle window.
    pub queued_messages: usize,
    /// Current agent status.
    pub status: AgentStatus,
}

/// A single user/agent conversation and its run loop.
pub struct Conversation {
    id: ConversationId,
    parent_id: Option<ConversationId>,
    state: SharedState,
    agent: Arc<Agent>,
    config: EngineConfig,
    queue: Mutex<VecDeque<String>>,
    sinks: Vec<Arc<dyn EventSink>>,
    registry: Mutex<Weak<ConversationRegistry>>,
    closed: AtomicBool,
    detector: StuckDetector,
}

/// Assembles a [`Conversation`] from its collaborators.
pub struct ConversationBuilder {
    agent: Arc<Agent>,
    config: EngineConfig,
    parent_id: Option<ConversationId>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl ConversationBuilder {
    /// Replaces the default engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Marks the conversation as a child of the given parent.
    #[must_use]
    pub fn parent(mut self, parent_id: ConversationId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Adds an event sink notified for every appended event.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Builds the conversation, seeding the configured system prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured confirmation mode is invalid.
    pub fn build(self) -> Result<Arc<Conversation>> {
        let policy = self.config.confirmation.to_policy()?;
        let state = match self.parent_id {
            Some(parent_id) => ConversationState::with_parent(policy, parent_id),
            None => ConversationState::new(policy),
        };
        let id = state.id();
        let parent_id = state.parent_id();

        let conversation = Arc::new(Conversation {
            id,
            parent_id,
            state: SharedState::new(state),
            agent: self.agent,
            config: self.config,
            queue: Mutex::new(VecDeque::new()),
            sinks: self.sinks,
            registry: Mutex::new(Weak::new()),
            closed: AtomicBool::new(false),
            detector: StuckDetector::new(),
        });
        if let Some(prompt) = conversation.config.system_prompt.clone() {
            conversation.emit(Event::system_prompt(prompt));
        }
        Ok(conversation)
    }
}

impl Conversation {
    /// Starts building a conversation around an agent.
    #[must_use]
    pub fn builder(agent: Arc<Agent>) -> ConversationBuilder {
        ConversationBuilder {
            agent,
            config: EngineConfig::default(),
            parent_id: None,
            sinks: Vec::new(),
        }
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

    /// Borrow the shared state handle, for snapshotting and inspection.
    #[must_use]
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// The engine configuration this conversation runs under.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current agent status.
    #[must_use]
    pub fn status(&self) -> AgentStatus {
        self.state.lock().status()
    }

    /// Delivers a user message, queueing it if the agent is busy.
    ///
    /// A message arriving in a terminal status resets it to idle, opening
    /// a new turn. Messages are always user-authored; agent output enters
    /// the log through the step loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation is closed.
    pub fn send_message<T: Into<String>>(&self, text: T) -> Result<()> {
        self.ensure_open()?;
        let text = text.into();
        if self.state.lock().status().is_busy() {
            debug!(conversation = %self.id, "agent busy; queueing message");
            self.queue.lock_ignore_poison().push_back(text);
            return Ok(());
        }
        self.apply_user_message(text);
        Ok(())
    }

    /// Runs the step loop until the agent finishes, pauses, or awaits
    /// confirmation.
    ///
    /// Calling `run` while waiting for confirmation is the approval: the
    /// pending actions execute first. A paused conversation resumes. The
    /// loop stops unconditionally after the configured iteration cap.
    /// Queued messages drain once the loop ends, if the agent is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation is closed or if a model call
    /// fails; the status is `Error` afterwards until a new message
    /// arrives.
    pub async fn run(&self) -> Result<()> {
        self.ensure_open()?;
        {
            let mut guard = self.state.lock();
            if guard.status() == AgentStatus::Paused {
                guard.set_status(AgentStatus::Running);
            }
        }

        let context = StepContext::new(&self.state, &self.sinks);
        let mut iterations = 0;
        loop {
            if iterations >= self.config.max_iterations_per_run {
                warn!(conversation = %self.id, iterations, "iteration cap reached; ending run");
                let mut guard = self.state.lock();
                if guard.status() == AgentStatus::Running {
                    guard.set_status(AgentStatus::Idle);
                }
                break;
            }
            iterations += 1;

            {
                let mut guard = self.state.lock();
                match guard.status() {
                    AgentStatus::Finished | AgentStatus::Error | AgentStatus::Paused => break,
                    AgentStatus::Idle | AgentStatus::WaitingForConfirmation => {
                        guard.set_status(AgentStatus::Running);
                    }
                    AgentStatus::Running => {}
                }
            }

            let outcome = match self.agent.step(&context).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.state.lock().set_status(AgentStatus::Error);
                    return Err(error);
                }
            };

            if self.config.stuck_detection && self.is_stuck() {
                // Advisory only; the application decides whether to abort.
                warn!(conversation = %self.id, "agent looks stuck");
            }

            match outcome {
                StepOutcome::Progressed => {}
                StepOutcome::AwaitingConfirmation | StepOutcome::Finished => break,
            }
        }

        self.drain_queue();
        Ok(())
    }

    /// Requests a cooperative pause.
    ///
    /// Takes effect between loop iterations; an in-flight model or tool
    /// call completes first.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation is closed or not idle or
    /// running.
    pub fn pause(&self) -> Result<()> {
        self.ensure_open()?;
        {
            let mut guard = self.state.lock();
            match guard.status() {
                AgentStatus::Idle | AgentStatus::Running => {
                    guard.set_status(AgentStatus::Paused);
                }
                other => {
                    return Err(Error::Conversation(format!(
                        "cannot pause conversation in status {other}"
                    )));
                }
            }
        }
        self.emit(Event::pause());
        Ok(())
    }

    /// Rejects every pending action and returns the agent to idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation is closed.
    pub fn reject_pending_actions<T: Into<String>>(&self, reason: T) -> Result<()> {
        self.ensure_open()?;
        let reason = reason.into();
        let pending: Vec<EventId> = {
            let guard = self.state.lock();
            guard
                .events()
                .unmatched_actions()
                .into_iter()
                .map(|(action_id, _)| action_id)
                .collect()
        };
        for action_id in pending {
            self.emit(Event::rejection(action_id, reason.clone()));
        }

        let mut guard = self.state.lock();
        if guard.status() == AgentStatus::WaitingForConfirmation {
            guard.set_status(AgentStatus::Idle);
        }
        Ok(())
    }

    /// Replaces the confirmation policy for subsequent turns.
    pub fn set_confirmation_policy(&self, policy: ConfirmationPolicy) {
        self.state.lock().set_confirmation_policy(policy);
    }

    /// Merges secrets into the conversation's secrets manager.
    pub fn update_secrets(&self, secrets: HashMap<String, SecretSource>) {
        self.state.lock().secrets_mut().update_secrets(secrets);
    }

    /// Queue depth and current status.
    #[must_use]
    pub fn get_queue_status(&self) -> ConversationStats {
        let status = self.state.lock().status();
        let queued_messages = self.queue.lock_ignore_poison().len();
        ConversationStats {
            queued_messages,
            status,
        }
    }

    /// Whether recent turns look like an unproductive loop.
    #[must_use]
    pub fn is_stuck(&self) -> bool {
        let guard = self.state.lock();
        self.detector.is_stuck(guard.events())
    }

    /// Spawns a child conversation registered under this one.
    ///
    /// # Errors
    ///
    /// Returns an error if this conversation is closed or not registered.
    pub fn create_child(&self, agent: Arc<Agent>) -> Result<Arc<Self>> {
        self.ensure_open()?;
        self.registry()?.create_child_conversation(self.id, agent)
    }

    /// Looks up a direct child by id.
    #[must_use]
    pub fn get_child_conversation(&self, child_id: ConversationId) -> Option<Arc<Self>> {
        let registry = self.registry().ok()?;
        let child = registry.get(child_id)?;
        (child.parent_id == Some(self.id)).then_some(child)
    }

    /// Ids of all direct children, in registry order.
    #[must_use]
    pub fn list_child_conversations(&self) -> Vec<ConversationId> {
        self.registry()
            .map(|registry| registry.get_children(self.id))
            .unwrap_or_default()
    }

    /// Closes this conversation, cascading to all children first.
    ///
    /// Idempotent; every handle keeps working read-only, but mutating
    /// calls fail afterwards.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(conversation = %self.id, "closing conversation");
        if let Ok(registry) = self.registry() {
            for child_id in registry.get_children(self.id) {
                if let Some(child) = registry.get(child_id) {
                    child.close();
                }
            }
            registry.unregister(self.id);
        }
        self.queue.lock_ignore_poison().clear();
    }

    /// Links this conversation to the registry that holds it.
    pub(crate) fn attach_registry(&self, registry: Weak<ConversationRegistry>) {
        *self.registry.lock_ignore_poison() = registry;
    }

    fn registry(&self) -> Result<Arc<ConversationRegistry>> {
        self.registry
            .lock_ignore_poison()
            .upgrade()
            .ok_or_else(|| {
                Error::Conversation(format!("conversation {} is not registered", self.id))
            })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Conversation(format!(
                "conversation {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    fn emit(&self, event: Event) -> EventId {
        StepContext::new(&self.state, &self.sinks).emit(event)
    }

    /// Appends a user message, reopening a terminal conversation.
    fn apply_user_message(&self, text: String) {
        {
            let mut guard = self.state.lock();
            if guard.status().is_terminal() {
                guard.set_status(AgentStatus::Idle);
            }
        }
        self.emit(Event::user_message(text));
    }

    /// Drains queued messages in FIFO order while the agent stays idle.
    fn drain_queue(&self) {
        loop {
            {
                let guard = self.state.lock();
                let status = guard.status();
                if status.is_busy() || status == AgentStatus::Paused {
                    break;
                }
            }
            let Some(message) = self.queue.lock_ignore_poison().pop_front() else {
                break;
            };
            debug!(conversation = %self.id, "draining queued message");
            self.apply_user_message(message);
        }
    }
}
