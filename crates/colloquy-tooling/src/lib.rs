//! Tool capability layer for the conversation engine.
//!
//! Defines the [`Tool`] trait that concrete tools implement, the input and
//! output types exchanged with the step loop, and the explicitly-populated
//! [`ToolRegistry`] resolved once at agent construction.

/// Built-in terminal tool that ends a conversation.
pub mod finish;
/// Tool registry for managing available tools.
pub mod registry;
/// Tool trait and execution types.
pub mod tool;

pub use finish::{FINISH_TOOL_NAME, FinishTool};
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolDescriptor, ToolError, ToolInput, ToolOutput, ToolResult};
