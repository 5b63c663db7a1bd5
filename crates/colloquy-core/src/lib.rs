//! Core types for the conversation orchestration engine.
//!
//! This crate provides the event-sourced conversation state, the agent
//! status machine, the secrets manager, security-risk gating policies, and
//! the stuck-loop detector shared across the engine.

/// Engine configuration loaded from TOML.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Event types for the conversation log.
pub mod event;
/// Append-only event log.
pub mod log;
/// Secret storage, resolution, and output masking.
pub mod secrets;
/// Security risk classification and confirmation policies.
pub mod security;
/// Conversation state and status machine.
pub mod state;
/// Stuck-loop detection over the event log tail.
pub mod stuck;
/// Synchronization utilities for handling poisoned locks.
pub mod sync;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use event::{
    ActionEvent, AgentErrorEvent, Event, EventId, EventKind, EventSource, ObservationEvent,
    RejectionEvent,
};
pub use log::EventLog;
pub use secrets::{MASK_TOKEN, SecretSource, SecretsManager};
pub use security::{
    ConfirmationPolicy, SecurityAnalyzer, SecurityRisk, assess_actions,
    batch_requires_confirmation,
};
pub use state::{AgentStatus, ConversationId, ConversationState, SharedState};
pub use stuck::StuckDetector;
pub use sync::IgnoreLock;
