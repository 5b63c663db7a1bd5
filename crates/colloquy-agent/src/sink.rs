//! Event observers and snapshot persistence.
//!
//! Sinks are side-effect-only: they receive a clone of every appended
//! event after the state lock is released and must not mutate
//! conversation state. The [`FileStore`] seam is an opaque key/value
//! contract used only for optional snapshotting; core correctness never
//! depends on it.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use colloquy_core::event::Event;
use colloquy_core::state::{AgentStatus, ConversationId, SharedState};
use colloquy_core::{IgnoreLock as _, Result};

/// Observer notified for every event appended to a conversation log.
pub trait EventSink: Send + Sync {
    /// Handles one appended event. Must not block or fail.
    fn on_event(&self, event: &Event);
}

/// Sink that buffers every event it sees, for tests and debugging.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clones out everything observed so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock_ignore_poison().clone()
    }

    /// Number of events observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock_ignore_poison().len()
    }

    /// Whether nothing has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock_ignore_poison().is_empty()
    }
}

impl EventSink for CollectingSink {
    fn on_event(&self, event: &Event) {
        self.events.lock_ignore_poison().push(event.clone());
    }
}

/// Opaque key/value persistence collaborator.
pub trait FileStore: Send + Sync {
    /// Writes the contents under the key, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store rejects the write.
    fn put(&self, key: &str, contents: &str) -> Result<()>;

    /// Reads the contents under the key, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails to read.
    fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Serializable snapshot of a conversation's durable state.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Conversation id.
    pub id: ConversationId,
    /// Agent status at snapshot time.
    pub status: AgentStatus,
    /// Parent conversation, if this is a child.
    pub parent_id: Option<ConversationId>,
    /// Full event log.
    pub events: Vec<Event>,
}

/// Persists a snapshot of the conversation and returns its key.
///
/// # Errors
///
/// Returns an error if serialization or the store write fails.
pub fn snapshot_conversation(store: &dyn FileStore, state: &SharedState) -> Result<String> {
    let snapshot = {
        let guard = state.lock();
        ConversationSnapshot {
            id: guard.id(),
            status: guard.status(),
            parent_id: guard.parent_id(),
            events: guard.events().as_slice().to_vec(),
        }
    };
    let key = snapshot_key(snapshot.id);
    let serialized = serde_json::to_string_pretty(&snapshot)?;
    store.put(&key, &serialized)?;
    Ok(key)
}

/// Loads a previously persisted snapshot, if one exists.
///
/// # Errors
///
/// Returns an error if the store read or deserialization fails.
pub fn load_snapshot(
    store: &dyn FileStore,
    id: ConversationId,
) -> Result<Option<ConversationSnapshot>> {
    match store.get(&snapshot_key(id))? {
        Some(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        None => Ok(None),
    }
}

fn snapshot_key(id: ConversationId) -> String {
    format!("conversations/{id}.json")
}
