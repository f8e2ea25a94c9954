//! Conversation storage.
//!
//! The store is a passive keyed container. It never validates message
//! content and never mutates a conversation on its own; the session manager
//! owns every change and hands whole conversations back through `save`.

use crate::conversation::Conversation;
use crate::error::StoreError;
use async_trait::async_trait;
use parley_core::{ConversationId, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Trait for conversation storage.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Gets a conversation by ID.
    async fn get(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Creates a conversation with a fresh ID and the system preamble.
    ///
    /// The new conversation is not persisted until it is saved.
    async fn create(
        &self,
        system_preamble: &str,
        owner: Option<String>,
    ) -> Result<Conversation, StoreError> {
        Ok(Conversation::new(system_preamble, owner))
    }

    /// Inserts or replaces a conversation, keyed by its ID.
    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError>;
}

/// In-process conversation store.
///
/// Each save replaces the whole conversation under a single write lock, so a
/// reader never observes a half-applied append.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl InMemoryConversationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no conversation has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ConversationId, Conversation>> {
        // A panic while holding the lock cannot leave a half-written entry,
        // so a poisoned map is still consistent.
        self.conversations
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self.read().get(&id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.conversations
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(conversation.id, conversation.clone());
        Ok(())
    }
}
