use core::result::Result as CoreResult;
use std::io::Error as IoError;

use colloquy_tooling::ToolError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for engine operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur in the conversation engine.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model collaborator failed to produce a response.
    #[error("Model transport error: {0}")]
    Transport(String),

    /// The model requested a tool that is not registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments failed validation against the tool's schema.
    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments {
        /// Name of the tool whose arguments were rejected.
        tool: String,
        /// Why validation failed.
        reason: String,
    },

    /// A confirmation policy was constructed with invalid parameters.
    #[error("Invalid confirmation policy: {0}")]
    InvalidPolicy(String),

    /// A dynamic secret resolver failed.
    #[error("Secret resolution failed: {0}")]
    SecretResolution(String),

    /// A conversation-level operation was invalid in the current state.
    #[error("Conversation error: {0}")]
    Conversation(String),

    /// A tool failed during execution.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Only transport failures from the model collaborator are transient;
    /// everything else reflects invalid input or a programming error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error1 = Error::UnknownTool("browse".to_owned());
        assert_eq!(error1.to_string(), "Unknown tool: browse");

        let error2 = Error::InvalidArguments {
            tool: "execute_bash".to_owned(),
            reason: "missing field `command`".to_owned(),
        };
        assert_eq!(
            error2.to_string(),
            "Invalid arguments for tool 'execute_bash': missing field `command`"
        );

        let error3 = Error::Transport("connection reset".to_owned());
        assert_eq!(error3.to_string(), "Model transport error: connection reset");
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::Transport("timeout".to_owned()).is_retryable());

        assert!(!Error::UnknownTool("tool".to_owned()).is_retryable());
        assert!(!Error::Config("bad config".to_owned()).is_retryable());
        assert!(!Error::SecretResolution("vault down".to_owned()).is_retryable());
    }

    #[test]
    fn test_error_from_tool_error() {
        let tool_error = ToolError::ExecutionFailed("exit 1".to_owned());
        let error: Error = tool_error.into();
        assert!(matches!(error, Error::Tool(_)));
    }
}
