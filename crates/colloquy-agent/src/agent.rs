//! The agent step contract.
//!
//! [`Agent::step`] advances a conversation by exactly one turn. Pending
//! actions left over from a confirmation round-trip execute first; only
//! when none remain is the model queried. Proposed tool calls are
//! validated, risk-classified, recorded as action events, gated by the
//! confirmation policy, and executed.
//!
//! The state lock is acquired per access and never held across a model
//! or tool await.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use colloquy_core::Result;
use colloquy_core::event::{ActionEvent, Event, EventId, ObservationEvent};
use colloquy_core::security::{
    SecurityAnalyzer, SecurityRisk, assess_actions, batch_requires_confirmation,
};
use colloquy_core::state::{AgentStatus, SharedState};
use colloquy_tooling::{ToolInput, ToolRegistry};

use crate::model::{ModelClient, ToolCallRequest, events_to_messages};
use crate::sink::EventSink;

/// What a single step accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Events were produced and the loop should continue.
    Progressed,
    /// Proposed actions are recorded and await user confirmation.
    AwaitingConfirmation,
    /// The agent ended its turn.
    Finished,
}

/// Per-run handles handed to [`Agent::step`].
pub struct StepContext<'run> {
    state: &'run SharedState,
    sinks: &'run [Arc<dyn EventSink>],
}

impl<'run> StepContext<'run> {
    /// Creates a context over shared state and event sinks.
    #[must_use]
    pub fn new(state: &'run SharedState, sinks: &'run [Arc<dyn EventSink>]) -> Self {
        Self { state, sinks }
    }

    /// Borrow the conversation state handle.
    #[must_use]
    pub fn state(&self) -> &SharedState {
        self.state
    }

    /// Appends an event to the log and notifies every sink.
    ///
    /// Sinks observe a clone after the state lock is released, so a slow
    /// sink never blocks another thread's access to the state.
    pub fn emit(&self, event: Event) -> EventId {
        let appended = { self.state.lock().append_event(event).clone() };
        for sink in self.sinks {
            sink.on_event(&appended);
        }
        appended.id
    }
}

/// Drives one conversation turn at a time against a model and a tool set.
pub struct Agent {
    model: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    analyzer: Option<Arc<dyn SecurityAnalyzer>>,
}

impl Agent {
    /// Creates an agent over a model client and a tool registry.
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools,
            analyzer: None,
        }
    }

    /// Attaches an analyzer used to classify proposed actions.
    ///
    /// Without one, every action is treated as risk `Unknown`.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SecurityAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Borrow the tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Advances the conversation by one turn.
    ///
    /// # Errors
    ///
    /// Returns an error if the model call fails. Tool validation and
    /// execution failures are recorded as agent error events instead of
    /// being returned.
    pub async fn step(&self, context: &StepContext<'_>) -> Result<StepOutcome> {
        let pending: Vec<(EventId, ActionEvent)> = {
            let guard = context.state().lock();
            guard
                .events()
                .unmatched_actions()
                .into_iter()
                .map(|(action_id, action)| (action_id, action.clone()))
                .collect()
        };
        if !pending.is_empty() {
            debug!(actions = pending.len(), "executing pending actions");
            return self.execute_actions(context, pending).await;
        }

        let (messages, policy) = {
            let guard = context.state().lock();
            (
                events_to_messages(guard.events()),
                guard.confirmation_policy(),
            )
        };
        let descriptors = self.tools.descriptors();
        debug!(model = self.model.name(), messages = messages.len(), "querying model");
        let turn = self.model.complete(&messages, &descriptors).await?;

        if turn.tool_calls.is_empty() {
            context.emit(Event::agent_message(turn.content.unwrap_or_default()));
            context.state().lock().set_status(AgentStatus::Finished);
            return Ok(StepOutcome::Finished);
        }

        let (proposed, unknown_tool) = self.validate_calls(context, turn.tool_calls);
        if unknown_tool {
            context.state().lock().set_status(AgentStatus::Finished);
            return Ok(StepOutcome::Finished);
        }
        if proposed.is_empty() {
            // Every call failed validation; the errors are on the log and
            // the next model turn sees them.
            return Ok(StepOutcome::Progressed);
        }

        let recorded: Vec<(EventId, ActionEvent)> = self
            .classify(proposed)
            .into_iter()
            .map(|action| (context.emit(Event::action(action.clone())), action))
            .collect();

        let batch: Vec<(&ActionEvent, SecurityRisk)> = recorded
            .iter()
            .map(|(_, action)| (action, action.risk))
            .collect();
        if batch_requires_confirmation(&policy, &batch) {
            info!(actions = batch.len(), "actions await confirmation");
            context
                .state()
                .lock()
                .set_status(AgentStatus::WaitingForConfirmation);
            return Ok(StepOutcome::AwaitingConfirmation);
        }

        self.execute_actions(context, recorded).await
    }

    /// Resolves and validates each tool call against its schema.
    ///
    /// A validation failure records an error for that call only and the
    /// rest of the batch proceeds. An unknown tool name records an error
    /// and flags the turn as over.
    fn validate_calls(
        &self,
        context: &StepContext<'_>,
        calls: Vec<ToolCallRequest>,
    ) -> (Vec<ActionEvent>, bool) {
        let mut proposed = Vec::with_capacity(calls.len());
        let mut unknown_tool = false;
        for call in calls {
            let Some(tool) = self.tools.get_tool(&call.name) else {
                context.emit(Event::agent_error(
                    None,
                    format!("Unknown tool '{}'", call.name),
                ));
                unknown_tool = true;
                continue;
            };
            if let Err(error) = tool.validate(&call.arguments) {
                context.emit(Event::agent_error(
                    None,
                    format!("Invalid arguments for '{}': {error}", call.name),
                ));
                continue;
            }
            proposed.push(ActionEvent {
                tool_name: call.name,
                arguments: call.arguments,
                risk: SecurityRisk::Unknown,
                call_id: call.call_id,
            });
        }
        (proposed, unknown_tool)
    }

    /// Assigns each action its analyzed risk.
    fn classify(&self, mut actions: Vec<ActionEvent>) -> Vec<ActionEvent> {
        let refs: Vec<&ActionEvent> = actions.iter().collect();
        let risks = assess_actions(self.analyzer.as_deref(), &refs);
        drop(refs);
        for (action, risk) in actions.iter_mut().zip(risks) {
            action.risk = risk;
        }
        actions
    }

    /// Executes recorded actions in order, answering each on the log.
    ///
    /// A `finish` action produces a synthetic observation and ends the
    /// turn after the rest of the batch has executed.
    async fn execute_actions(
        &self,
        context: &StepContext<'_>,
        actions: Vec<(EventId, ActionEvent)>,
    ) -> Result<StepOutcome> {
        let mut finished = false;
        for (action_id, action) in actions {
            if action.is_finish() {
                let content = action
                    .arguments
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Task complete.")
                    .to_owned();
                context.emit(Event::observation(ObservationEvent {
                    action_id,
                    content,
                    success: true,
                }));
                finished = true;
                continue;
            }

            let Some(tool) = self.tools.get_tool(&action.tool_name) else {
                context.emit(Event::agent_error(
                    Some(action_id),
                    format!("Unknown tool '{}'", action.tool_name),
                ));
                continue;
            };
            match tool.execute(ToolInput::new(action.arguments.clone())).await {
                Ok(output) => {
                    let content = {
                        context
                            .state()
                            .lock()
                            .secrets_mut()
                            .mask_secrets_in_output(&output.content)
                    };
                    context.emit(Event::observation(ObservationEvent {
                        action_id,
                        content,
                        success: output.success,
                    }));
                }
                Err(error) => {
                    // Error text can echo tool input, so it is masked like
                    // observation content.
                    let message = {
                        context
                            .state()
                            .lock()
                            .secrets_mut()
                            .mask_secrets_in_output(&format!(
                                "Tool '{}' failed: {error}",
                                action.tool_name
                            ))
                    };
                    context.emit(Event::agent_error(Some(action_id), message));
                }
            }
        }

        if finished {
            context.state().lock().set_status(AgentStatus::Finished);
            return Ok(StepOutcome::Finished);
        }
        Ok(StepOutcome::Progressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockModelClient;
    use async_trait::async_trait;
    use colloquy_core::event::EventKind;
    use colloquy_core::security::ConfirmationPolicy;
    use colloquy_core::state::ConversationState;
    use colloquy_tooling::{
        FINISH_TOOL_NAME, FinishTool, Tool, ToolError, ToolOutput, ToolResult,
    };
    use serde_json::json;

    struct ShellTool;

    #[async_trait]
    impl Tool for ShellTool {
        fn name(&self) -> &'static str {
            "execute_bash"
        }

        fn description(&self) -> &'static str {
            "Runs a shell command"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "command": { "type": "string" } },
                "required": ["command"]
            })
        }

        fn validate(&self, arguments: &Value) -> ToolResult<()> {
            if arguments.get("command").and_then(Value::as_str).is_some() {
                Ok(())
            } else {
                Err(ToolError::InvalidArguments(
                    "command is required".to_owned(),
                ))
            }
        }

        async fn execute(&self, input: ToolInput) -> ToolResult<ToolOutput> {
            let command = input
                .arguments
                .get("command")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(ToolOutput::success(format!("ran: {command}")))
        }
    }

    fn shared_state(policy: ConfirmationPolicy) -> SharedState {
        let state = SharedState::new(ConversationState::new(policy));
        state.lock().append_event(Event::user_message("go"));
        state
    }

    fn agent_with(client: MockModelClient) -> Agent {
        let tools = ToolRegistry::new()
            .with_tool(Arc::new(ShellTool))
            .with_tool(Arc::new(FinishTool));
        Agent::new(Arc::new(client), tools)
    }

    fn kinds(state: &SharedState) -> Vec<EventKind> {
        state
            .lock()
            .events()
            .iter()
            .map(|event| event.kind.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_plain_message_finishes_turn() {
        let agent = agent_with(MockModelClient::new().with_message("all done"));
        let state = shared_state(ConfirmationPolicy::NeverConfirm);
        let context = StepContext::new(&state, &[]);

        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::Finished)));
        assert_eq!(state.lock().status(), AgentStatus::Finished);
        assert!(state.lock().events().iter().any(Event::is_agent_message));
    }

    fn mixed_validity_turn() -> crate::model::AssistantTurn {
        crate::model::AssistantTurn::with_tool_calls(vec![
            ToolCallRequest {
                call_id: "call-a".to_owned(),
                name: "execute_bash".to_owned(),
                arguments: json!({}),
            },
            ToolCallRequest {
                call_id: "call-b".to_owned(),
                name: "execute_bash".to_owned(),
                arguments: json!({"command": "pwd"}),
            },
        ])
    }

    #[tokio::test]
    async fn test_validation_failure_is_local() {
        let client = MockModelClient::new().with_turn(mixed_validity_turn());
        let agent = agent_with(client);
        let state = shared_state(ConfirmationPolicy::NeverConfirm);
        let context = StepContext::new(&state, &[]);

        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::Progressed)));

        let recorded = kinds(&state);
        // The malformed call produced an error; the valid one executed.
        assert!(recorded
            .iter()
            .any(|kind| matches!(kind, EventKind::AgentError(error) if error.action_id.is_none())));
        assert!(recorded
            .iter()
            .any(|kind| matches!(kind, EventKind::Observation(_))));
    }

    #[tokio::test]
    async fn test_unknown_tool_finishes_turn() {
        let client =
            MockModelClient::new().with_tool_call("frobnicate", json!({"target": "everything"}));
        let agent = agent_with(client);
        let state = shared_state(ConfirmationPolicy::NeverConfirm);
        let context = StepContext::new(&state, &[]);

        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::Finished)));
        assert_eq!(state.lock().status(), AgentStatus::Finished);
    }

    #[tokio::test]
    async fn test_always_confirm_leaves_action_pending() {
        let client = MockModelClient::new().with_tool_call("execute_bash", json!({"command": "ls"}));
        let agent = agent_with(client);
        let state = shared_state(ConfirmationPolicy::AlwaysConfirm);
        let context = StepContext::new(&state, &[]);

        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::AwaitingConfirmation)));
        assert_eq!(state.lock().status(), AgentStatus::WaitingForConfirmation);
        assert_eq!(state.lock().events().unmatched_actions().len(), 1);

        // A second step executes the pending action without a model call.
        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::Progressed)));
        assert!(state.lock().events().unmatched_actions().is_empty());
    }

    struct LeakyTool;

    #[async_trait]
    impl Tool for LeakyTool {
        fn name(&self) -> &'static str {
            "curl"
        }

        fn description(&self) -> &'static str {
            "Fetches a URL"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn execute(&self, _input: ToolInput) -> ToolResult<ToolOutput> {
            Err(ToolError::ExecutionFailed(
                "connection refused for token hunter2-secret".to_owned(),
            ))
        }
    }

    #[tokio::test]
    async fn test_tool_failure_text_is_masked() {
        use colloquy_core::secrets::{MASK_TOKEN, SecretSource};
        use std::collections::HashMap;

        let client = MockModelClient::new().with_tool_call("curl", json!({}));
        let tools = ToolRegistry::new().with_tool(Arc::new(LeakyTool));
        let agent = Agent::new(Arc::new(client), tools);
        let state = shared_state(ConfirmationPolicy::NeverConfirm);
        state.lock().secrets_mut().update_secrets(HashMap::from([(
            "API_KEY".to_owned(),
            SecretSource::value("hunter2-secret"),
        )]));
        let context = StepContext::new(&state, &[]);

        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::Progressed)));

        let errors: Vec<String> = state
            .lock()
            .events()
            .iter()
            .filter_map(|event| match &event.kind {
                EventKind::AgentError(error) => Some(error.message.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains(MASK_TOKEN));
        assert!(!errors[0].contains("hunter2-secret"));
    }

    #[tokio::test]
    async fn test_finish_action_ends_turn_without_confirmation() {
        let client =
            MockModelClient::new().with_tool_call(FINISH_TOOL_NAME, json!({"message": "done"}));
        let agent = agent_with(client);
        let state = shared_state(ConfirmationPolicy::AlwaysConfirm);
        let context = StepContext::new(&state, &[]);

        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::Finished)));
        assert_eq!(state.lock().status(), AgentStatus::Finished);
    }

    #[tokio::test]
    async fn test_finish_alongside_action_still_confirms() {
        let turn = crate::model::AssistantTurn::with_tool_calls(vec![
            ToolCallRequest {
                call_id: "call-a".to_owned(),
                name: "execute_bash".to_owned(),
                arguments: json!({"command": "ls"}),
            },
            ToolCallRequest {
                call_id: "call-b".to_owned(),
                name: FINISH_TOOL_NAME.to_owned(),
                arguments: json!({"message": "done"}),
            },
        ]);
        let agent = agent_with(MockModelClient::new().with_turn(turn));
        let state = shared_state(ConfirmationPolicy::AlwaysConfirm);
        let context = StepContext::new(&state, &[]);

        // The finish call does not exempt the batch from confirmation.
        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::AwaitingConfirmation)));
        assert_eq!(state.lock().status(), AgentStatus::WaitingForConfirmation);
        assert_eq!(state.lock().events().unmatched_actions().len(), 2);

        // Approval executes both pending actions and ends the turn.
        let outcome = agent.step(&context).await;
        assert!(matches!(outcome, Ok(StepOutcome::Finished)));
        assert_eq!(state.lock().status(), AgentStatus::Finished);
        let observations = state
            .lock()
            .events()
            .iter()
            .filter(|event| matches!(event.kind, EventKind::Observation(_)))
            .count();
        assert_eq!(observations, 2);
    }
}
