//! Conversation storage trait and the default in-memory implementation.
//!
//! The store is the external collaborator boundary: a narrow CRUD contract
//! with no algorithmic content. Implement [`ConversationStore`] over a real
//! database to persist conversations; the engine only ever calls it through
//! this trait and treats write failures as best-effort.

use crate::models::{Conversation, Message, Role, next_id, now_millis};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Error type for store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// CRUD contract for conversation persistence.
///
/// Ordering guarantees the engine relies on:
/// - `list_conversations` returns most recently updated first;
/// - `load_messages` returns creation order, never reordered.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation owned by `owner` and return its id.
    async fn create_conversation(&self, owner: &str, title: &str) -> Result<String, StoreError>;

    /// Append one message to a conversation and bump its `updated_at`.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    /// All conversations for `owner`, ordered by recency.
    async fn list_conversations(&self, owner: &str) -> Result<Vec<Conversation>, StoreError>;

    /// The messages of a conversation, ordered by creation.
    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Bump a conversation's `updated_at` without appending anything.
    async fn touch_conversation(&self, conversation_id: &str) -> Result<(), StoreError>;

    /// Remove a conversation and its messages.
    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct ConversationRecord {
    owner: String,
    conversation: Conversation,
    messages: Vec<Message>,
}

/// In-memory [`ConversationStore`] backed by a concurrent map.
///
/// The default store for the binary and for tests. Nothing survives process
/// exit; swap in a database-backed implementation for real persistence.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<DashMap<String, ConversationRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn create_conversation(&self, owner: &str, title: &str) -> Result<String, StoreError> {
        let id = next_id();
        let now = now_millis();
        self.records.insert(
            id.clone(),
            ConversationRecord {
                owner: owner.to_string(),
                conversation: Conversation {
                    id: id.clone(),
                    title: title.to_string(),
                    created_at_ms: now,
                    updated_at_ms: now,
                },
                messages: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut record = self
            .records
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        record.messages.push(Message::new(role, content));
        record.conversation.updated_at_ms = now_millis();
        Ok(())
    }

    async fn list_conversations(&self, owner: &str) -> Result<Vec<Conversation>, StoreError> {
        let mut conversations: Vec<Conversation> = self
            .records
            .iter()
            .filter(|record| record.owner == owner)
            .map(|record| record.conversation.clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        Ok(conversations)
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let record = self
            .records
            .get(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        // Messages are appended in creation order already.
        Ok(record.messages.clone())
    }

    async fn touch_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut record = self
            .records
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))?;
        record.conversation.updated_at_ms = now_millis();
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.records
            .remove(conversation_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(conversation_id.to_string()))
    }
}
