//! Provider-agnostic chat model seam.
//!
//! The engine never talks to a concrete LLM provider. It converts the
//! event log into a flat [`ChatMessage`] list, hands it to a
//! [`ModelClient`], and receives an [`AssistantTurn`] back. Transport
//! retries, token accounting, and provider quirks all live behind the
//! trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use colloquy_core::Result;
use colloquy_core::event::{EventId, EventKind, EventSource};
use colloquy_core::log::EventLog;
use colloquy_tooling::ToolDescriptor;

/// Role a chat message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Instructions seeding the conversation.
    System,
    /// The human user.
    User,
    /// The model itself.
    Assistant,
    /// A tool result answering an assistant tool call.
    Tool,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider correlation id for pairing results with calls.
    pub call_id: String,
    /// Name of the requested tool.
    pub name: String,
    /// Raw JSON arguments, validated before execution.
    pub arguments: Value,
}

/// One message in the flat list sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who the message is attributed to.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Tool calls carried by an assistant message.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Correlation id when this is a tool result.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system<T: Into<String>>(content: T) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// A user message.
    #[must_use]
    pub fn user<T: Into<String>>(content: T) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// A plain assistant message.
    #[must_use]
    pub fn assistant<T: Into<String>>(content: T) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// An assistant message carrying one tool call.
    #[must_use]
    pub fn assistant_tool_call(call: ToolCallRequest) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: vec![call],
            tool_call_id: None,
        }
    }

    /// A tool result answering the call with the given correlation id.
    #[must_use]
    pub fn tool_result<T: Into<String>>(call_id: String, content: T) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id),
        }
    }
}

/// One model response: optional text plus zero or more tool calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantTurn {
    /// Assistant text, if any.
    pub content: Option<String>,
    /// Tool calls the model wants executed.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Provider response id, opaque to the engine.
    pub response_id: String,
}

impl AssistantTurn {
    /// A plain text turn with no tool calls.
    #[must_use]
    pub fn message<T: Into<String>>(content: T) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            response_id: String::new(),
        }
    }

    /// A turn proposing the given tool calls.
    #[must_use]
    pub fn with_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
            response_id: String::new(),
        }
    }
}

/// Completion-capable model collaborator.
///
/// Implementations must be safe to retry: a `complete` call may be
/// re-issued after a transport failure with no side effects beyond token
/// usage.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier for logging.
    fn name(&self) -> &'static str;

    /// Produces the next assistant turn for the given history.
    ///
    /// # Errors
    ///
    /// Returns a transport error once the client's own retry budget is
    /// exhausted.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<AssistantTurn>;
}

/// Converts the event log into the flat message list a model consumes.
///
/// Observations, rejections, and action-scoped errors become tool-role
/// messages keyed by the originating call's correlation id, so providers
/// that pair calls with results see a consistent transcript. Pause events
/// carry no information the model needs and are skipped.
#[must_use]
pub fn events_to_messages(log: &EventLog) -> Vec<ChatMessage> {
    let mut call_ids: HashMap<EventId, String> = HashMap::new();
    let mut messages = Vec::new();

    for event in log.iter() {
        match &event.kind {
            EventKind::SystemPrompt { content } => {
                messages.push(ChatMessage::system(content.clone()));
            }
            EventKind::Message { content } => {
                let message = if event.source == EventSource::Agent {
                    ChatMessage::assistant(content.clone())
                } else {
                    ChatMessage::user(content.clone())
                };
                messages.push(message);
            }
            EventKind::Action(action) => {
                call_ids.insert(event.id, action.call_id.clone());
                messages.push(ChatMessage::assistant_tool_call(ToolCallRequest {
                    call_id: action.call_id.clone(),
                    name: action.tool_name.clone(),
                    arguments: action.arguments.clone(),
                }));
            }
            EventKind::Observation(observation) => {
                let call_id = call_ids
                    .get(&observation.action_id)
                    .cloned()
                    .unwrap_or_default();
                messages.push(ChatMessage::tool_result(call_id, observation.content.clone()));
            }
            EventKind::AgentError(error) => {
                let answered = error.action_id.and_then(|action_id| call_ids.get(&action_id));
                match answered {
                    Some(call_id) => messages.push(ChatMessage::tool_result(
                        call_id.clone(),
                        format!("Error: {}", error.message),
                    )),
                    None => messages.push(ChatMessage::user(format!("Error: {}", error.message))),
                }
            }
            EventKind::Pause => {}
            EventKind::CondensationSummary { summary } => {
                messages.push(ChatMessage::user(format!(
                    "Summary of earlier conversation: {summary}"
                )));
            }
            EventKind::Rejection(rejection) => {
                let call_id = call_ids
                    .get(&rejection.action_id)
                    .cloned()
                    .unwrap_or_default();
                messages.push(ChatMessage::tool_result(
                    call_id,
                    format!("Action rejected by the user: {}", rejection.reason),
                ));
            }
        }
    }
    messages
}
