//! Conversation orchestration over a model client and a tool registry.
//!
//! This crate wires the core event and state types into a running engine:
//! the [`Agent`] step contract, the [`Conversation`] run loop with its
//! message queue and cooperative pause, the [`ConversationRegistry`] with
//! parent/child indices, and the provider-agnostic [`ModelClient`] seam
//! with a scripted [`MockModelClient`] test double.

/// The agent step contract.
pub mod agent;
/// Conversation run loop, message queue, pause, and close.
pub mod conversation;
/// Scripted model client for tests and offline runs.
pub mod mock;
/// Provider-agnostic chat model seam.
pub mod model;
/// Process-wide conversation registry with parent/child indices.
pub mod registry;
/// Event observers and snapshot persistence.
pub mod sink;

pub use agent::{Agent, StepContext, StepOutcome};
pub use conversation::{Conversation, ConversationBuilder, ConversationStats};
pub use mock::MockModelClient;
pub use model::{
    AssistantTurn, ChatMessage, ModelClient, Role, ToolCallRequest, events_to_messages,
};
pub use registry::ConversationRegistry;
pub use sink::{
    CollectingSink, ConversationSnapshot, EventSink, FileStore, load_snapshot,
    snapshot_conversation,
};
