//! Scripted model client for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use colloquy_core::{Error, IgnoreLock as _, Result};
use colloquy_tooling::ToolDescriptor;

use crate::model::{AssistantTurn, ChatMessage, ModelClient, ToolCallRequest};

/// Model client replaying queued turns in order.
///
/// Every `complete` call records the message list it received, so tests
/// can assert on the transcript the model saw. When the script runs out
/// it returns a plain completion, which ends the turn and keeps run loops
/// terminating.
#[derive(Default)]
pub struct MockModelClient {
    script: Mutex<VecDeque<Result<AssistantTurn>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockModelClient {
    /// Creates a client with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a plain assistant message turn.
    #[must_use]
    pub fn with_message<T: Into<String>>(self, content: T) -> Self {
        self.push(Ok(AssistantTurn::message(content)));
        self
    }

    /// Queues a turn proposing a single tool call.
    ///
    /// The correlation id is derived from the script position so repeated
    /// calls stay distinct.
    #[must_use]
    pub fn with_tool_call<T: Into<String>>(self, name: T, arguments: Value) -> Self {
        let call_id = format!("call-{}", self.script.lock_ignore_poison().len());
        self.push(Ok(AssistantTurn::with_tool_calls(vec![ToolCallRequest {
            call_id,
            name: name.into(),
            arguments,
        }])));
        self
    }

    /// Queues a fully specified turn.
    #[must_use]
    pub fn with_turn(self, turn: AssistantTurn) -> Self {
        self.push(Ok(turn));
        self
    }

    /// Queues a transport failure.
    #[must_use]
    pub fn with_error<T: Into<String>>(self, message: T) -> Self {
        self.push(Err(Error::Transport(message.into())));
        self
    }

    /// Number of `complete` calls handled so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock_ignore_poison().len()
    }

    /// The message list from the most recent `complete` call.
    #[must_use]
    pub fn last_request(&self) -> Option<Vec<ChatMessage>> {
        self.requests.lock_ignore_poison().last().cloned()
    }

    fn push(&self, turn: Result<AssistantTurn>) {
        self.script.lock_ignore_poison().push_back(turn);
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDescriptor],
    ) -> Result<AssistantTurn> {
        self.requests.lock_ignore_poison().push(messages.to_vec());
        let scripted = self.script.lock_ignore_poison().pop_front();
        scripted.unwrap_or_else(|| Ok(AssistantTurn::message("Nothing further to do.")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let client = MockModelClient::new()
            .with_tool_call("execute_bash", json!({"command": "ls"}))
            .with_message("done");

        let first = client.complete(&[], &[]).await;
        assert!(first.is_ok());
        if let Ok(turn) = first {
            assert_eq!(turn.tool_calls.len(), 1);
            assert_eq!(turn.tool_calls[0].name, "execute_bash");
        }

        let second = client.complete(&[], &[]).await;
        assert!(second.is_ok());
        if let Ok(turn) = second {
            assert_eq!(turn.content.as_deref(), Some("done"));
            assert!(turn.tool_calls.is_empty());
        }
    }

    #[tokio::test]
    async fn test_empty_script_returns_plain_completion() {
        let client = MockModelClient::new();
        let turn = client.complete(&[], &[]).await;
        assert!(turn.is_ok());
        if let Ok(turn) = turn {
            assert!(turn.tool_calls.is_empty());
            assert!(turn.content.is_some());
        }
    }

    #[tokio::test]
    async fn test_records_requests() {
        let client = MockModelClient::new();
        assert_eq!(client.call_count(), 0);

        let messages = vec![ChatMessage::user("hello")];
        let result = client.complete(&messages, &[]).await;
        assert!(result.is_ok());

        assert_eq!(client.call_count(), 1);
        assert_eq!(client.last_request(), Some(messages));
    }

    #[tokio::test]
    async fn test_scripted_error_surfaces() {
        let client = MockModelClient::new().with_error("connection reset");
        let result = client.complete(&[], &[]).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
