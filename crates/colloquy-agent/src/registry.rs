//! Process-wide conversation registry with parent/child indices.
//!
//! The registry maps conversation ids to live instances and keeps the
//! parent/child indices consistent: a child id appears in exactly one
//! parent's child set, and the reverse index always agrees. Violations
//! are programming errors and panic rather than being papered over.
//!
//! The registry lock is distinct from every conversation's state lock and
//! is never held across a call into a conversation, which rules out
//! lock-ordering deadlocks between a parent and its children.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::debug;

use colloquy_core::state::ConversationId;
use colloquy_core::{Error, IgnoreLock as _, Result};

use crate::agent::Agent;
use crate::conversation::Conversation;

/// Process-wide default registry, for the outermost application boundary.
static GLOBAL_REGISTRY: Lazy<Arc<ConversationRegistry>> =
    Lazy::new(|| Arc::new(ConversationRegistry::new()));

#[derive(Default)]
struct RegistryInner {
    conversations: HashMap<ConversationId, Arc<Conversation>>,
    parents: HashMap<ConversationId, ConversationId>,
    children: HashMap<ConversationId, HashSet<ConversationId>>,
}

/// Thread-safe id-to-conversation registry with parent/child indices.
#[derive(Default)]
pub struct ConversationRegistry {
    inner: Mutex<RegistryInner>,
}

impl ConversationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default registry.
    ///
    /// Prefer constructing an explicit registry and passing it down; this
    /// exists for the outermost application boundary.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Records a conversation and links it back to this registry.
    ///
    /// # Panics
    ///
    /// Panics if the id is already registered, which indicates a
    /// registry-consistency bug.
    pub fn register(self: &Arc<Self>, conversation: &Arc<Conversation>) {
        conversation.attach_registry(Arc::downgrade(self));
        let id = conversation.id();

        let mut inner = self.inner.lock_ignore_poison();
        let previous = inner.conversations.insert(id, Arc::clone(conversation));
        assert!(
            previous.is_none(),
            "registry inconsistency: conversation {id} registered twice"
        );
        if let Some(parent_id) = conversation.parent_id() {
            let displaced = inner.parents.insert(id, parent_id);
            assert!(
                displaced.is_none(),
                "registry inconsistency: child {id} already indexed under a parent"
            );
            inner.children.entry(parent_id).or_default().insert(id);
        }
        debug!(conversation = %id, "registered conversation");
    }

    /// Removes a conversation and its index entries.
    ///
    /// Returns the removed instance, or `None` for an unknown id.
    ///
    /// # Panics
    ///
    /// Panics if the conversation still has registered children or if the
    /// parent/child indices disagree; both indicate registry-consistency
    /// bugs.
    pub fn unregister(&self, id: ConversationId) -> Option<Arc<Conversation>> {
        let mut inner = self.inner.lock_ignore_poison();
        let conversation = inner.conversations.remove(&id)?;

        let live_children = inner
            .children
            .get(&id)
            .is_some_and(|children| !children.is_empty());
        assert!(
            !live_children,
            "registry inconsistency: unregistering conversation {id} with live children"
        );
        inner.children.remove(&id);

        if let Some(parent_id) = inner.parents.remove(&id) {
            let removed = inner
                .children
                .get_mut(&parent_id)
                .is_some_and(|children| children.remove(&id));
            assert!(
                removed,
                "registry inconsistency: child {id} missing from parent {parent_id} index"
            );
        }
        debug!(conversation = %id, "unregistered conversation");
        Some(conversation)
    }

    /// Looks up a conversation by id.
    #[must_use]
    pub fn get(&self, id: ConversationId) -> Option<Arc<Conversation>> {
        self.inner
            .lock_ignore_poison()
            .conversations
            .get(&id)
            .map(Arc::clone)
    }

    /// The parent of a child conversation, if any.
    #[must_use]
    pub fn get_parent(&self, id: ConversationId) -> Option<ConversationId> {
        self.inner.lock_ignore_poison().parents.get(&id).copied()
    }

    /// Ids of a conversation's direct children.
    #[must_use]
    pub fn get_children(&self, parent_id: ConversationId) -> Vec<ConversationId> {
        self.inner
            .lock_ignore_poison()
            .children
            .get(&parent_id)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of registered conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock_ignore_poison().conversations.len()
    }

    /// Whether no conversations are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock_ignore_poison().conversations.is_empty()
    }

    /// Creates and registers a child of an existing conversation.
    ///
    /// The child gets a fresh id and shares no mutable state with its
    /// parent beyond the weak `parent_id` back-reference; it inherits the
    /// parent's engine configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent is unknown or its configuration
    /// fails to build a policy.
    pub fn create_child_conversation(
        self: &Arc<Self>,
        parent_id: ConversationId,
        agent: Arc<Agent>,
    ) -> Result<Arc<Conversation>> {
        let config = {
            let inner = self.inner.lock_ignore_poison();
            let parent = inner.conversations.get(&parent_id).ok_or_else(|| {
                Error::Conversation(format!("unknown parent conversation {parent_id}"))
            })?;
            parent.config().clone()
        };

        let child = Conversation::builder(agent)
            .config(config)
            .parent(parent_id)
            .build()?;
        self.register(&child);
        Ok(child)
    }

    /// Closes one child of the given parent and removes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the child is not registered under that parent.
    ///
    /// # Panics
    ///
    /// Panics if the child is indexed but its instance is gone, which
    /// indicates a registry-consistency bug.
    pub fn close_child_conversation(
        &self,
        parent_id: ConversationId,
        child_id: ConversationId,
    ) -> Result<()> {
        let child = {
            let inner = self.inner.lock_ignore_poison();
            if inner.parents.get(&child_id).copied() != Some(parent_id) {
                return Err(Error::Conversation(format!(
                    "conversation {child_id} is not a child of {parent_id}"
                )));
            }
            inner.conversations.get(&child_id).map(Arc::clone)
        };

        match child {
            // close() cascades to grandchildren and unregisters itself.
            Some(child) => {
                child.close();
                Ok(())
            }
            None => panic!("registry inconsistency: child {child_id} indexed but not registered"),
        }
    }

    /// Closes every direct child of the given parent.
    ///
    /// # Errors
    ///
    /// Returns the first error from closing a child.
    pub fn close_all_children(&self, parent_id: ConversationId) -> Result<()> {
        for child_id in self.get_children(parent_id) {
            self.close_child_conversation(parent_id, child_id)?;
        }
        Ok(())
    }
}
