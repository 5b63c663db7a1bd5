//! Built-in terminal tool that ends a conversation.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{Tool, ToolInput, ToolOutput, ToolResult};

/// Name of the built-in terminal tool.
///
/// An action calling this tool ends the conversation turn and is exempt
/// from confirmation under every policy.
pub const FINISH_TOOL_NAME: &str = "finish";

/// Terminal tool the model calls to signal that its task is complete.
///
/// Execution has no side effects; the step loop observes the tool name and
/// transitions the conversation to its finished state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinishTool;

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &'static str {
        FINISH_TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Signal that the task is complete and end the conversation turn"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Optional final message summarizing the outcome"
                }
            }
        })
    }

    async fn execute(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let message = input
            .arguments
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Task complete.");
        Ok(ToolOutput::success(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_finish_tool_default_message() {
        let tool = FinishTool;
        let output = tool.execute(ToolInput::new(json!({}))).await;
        assert!(output.is_ok());
        if let Ok(output) = output {
            assert!(output.success);
            assert_eq!(output.content, "Task complete.");
        }
    }

    #[tokio::test]
    async fn test_finish_tool_custom_message() {
        let tool = FinishTool;
        let input = ToolInput::new(json!({"message": "All files patched."}));
        let output = tool.execute(input).await;
        assert!(output.is_ok());
        if let Ok(output) = output {
            assert_eq!(output.content, "All files patched.");
        }
    }

    #[test]
    fn test_finish_tool_name_matches_constant() {
        assert_eq!(FinishTool.name(), FINISH_TOOL_NAME);
    }
}
