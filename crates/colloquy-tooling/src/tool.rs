use std::io::Error as IoError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Error as SerdeJsonError, Value};
use thiserror::Error;

/// Errors that can occur during tool validation or execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// The provided arguments were invalid or malformed.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool failed to execute its operation.
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    /// Failed to serialize or deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerdeJsonError),
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Arguments provided to a tool for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    /// JSON value containing the tool-specific arguments.
    pub arguments: Value,
}

impl ToolInput {
    /// Creates an input from a JSON arguments value.
    pub fn new(arguments: Value) -> Self {
        Self { arguments }
    }
}

/// Output returned by a tool after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Whether the tool execution succeeded.
    pub success: bool,
    /// Human-readable text describing the result.
    pub content: String,
    /// Optional JSON data containing tool-specific output.
    pub data: Option<Value>,
}

impl ToolOutput {
    /// Creates a successful output with the given content and no data.
    pub fn success<T: Into<String>>(content: T) -> Self {
        Self {
            success: true,
            content: content.into(),
            data: None,
        }
    }

    /// Creates a successful output with the given content and associated data.
    pub fn success_with_data<T: Into<String>>(content: T, data: Value) -> Self {
        Self {
            success: true,
            content: content.into(),
            data: Some(data),
        }
    }

    /// Creates a failed output with the given content.
    pub fn error<T: Into<String>>(content: T) -> Self {
        Self {
            success: false,
            content: content.into(),
            data: None,
        }
    }
}

/// Provider-agnostic description of a tool, advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: Value,
}

/// Trait for implementing executable tools invoked by the agent step loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique identifier for this tool.
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of what this tool does.
    fn description(&self) -> &'static str;

    /// Returns the JSON schema describing this tool's arguments.
    fn parameters(&self) -> Value;

    /// Validates arguments against this tool's schema without executing.
    ///
    /// The default implementation only requires a JSON object. Tools with
    /// required fields override this so malformed calls are rejected before
    /// any action is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidArguments`] if the arguments are malformed.
    fn validate(&self, arguments: &Value) -> ToolResult<()> {
        if arguments.is_object() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments(format!(
                "expected a JSON object, got {arguments}"
            )))
        }
    }

    /// Executes the tool with the provided (already validated) input.
    ///
    /// # Errors
    ///
    /// Returns a [`ToolError`] if execution fails.
    async fn execute(&self, input: ToolInput) -> ToolResult<ToolOutput>;
}
