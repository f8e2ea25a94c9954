//! Conversation state.
//!
//! A conversation is an ordered, append-only history that always begins with
//! exactly one system preamble. The message list is private so the only way
//! to change it is [`Conversation::append`].

use crate::error::AppendError;
use crate::message::{Message, MessageRole};
use chrono::{DateTime, Utc};
use parley_ai::ChatMessage;
use parley_core::ConversationId;
use serde::{Deserialize, Serialize};

/// Maximum characters kept in a derived title.
const TITLE_MAX_CHARS: usize = 50;

/// A conversation between a caller and the completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: ConversationId,
    /// Subject of the caller who started the conversation, if known.
    pub owner: Option<String>,
    messages: Vec<Message>,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// When the last message was appended.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Creates a conversation holding only the system preamble.
    #[must_use]
    pub fn new(system_preamble: impl Into<String>, owner: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            owner,
            messages: vec![Message::system(system_preamble)],
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a user or assistant message.
    ///
    /// # Errors
    ///
    /// Returns `AppendError` for a system message (the preamble is fixed at
    /// creation) or for blank content.
    pub fn append(&mut self, message: Message) -> Result<(), AppendError> {
        if message.role == MessageRole::System {
            return Err(AppendError::SystemAfterCreation);
        }
        if message.content.trim().is_empty() {
            return Err(AppendError::EmptyContent { role: message.role });
        }

        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
        Ok(())
    }

    /// Returns the full history, preamble first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the number of messages, preamble included.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Returns the last message.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the history as sent to the completion provider.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(Message::to_chat_message).collect()
    }

    /// Returns true if `caller` may continue or read this conversation.
    ///
    /// Conversations started without an owner are open to any caller.
    #[must_use]
    pub fn is_accessible_by(&self, caller: Option<&str>) -> bool {
        match self.owner.as_deref() {
            None => true,
            Some(owner) => caller == Some(owner),
        }
    }

    /// Derives a short title from the first user message.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        let first = self.messages.iter().find(|m| m.role == MessageRole::User)?;
        let content = first.content.trim();

        if content.chars().count() > TITLE_MAX_CHARS {
            let head: String = content.chars().take(TITLE_MAX_CHARS - 3).collect();
            Some(format!("{head}..."))
        } else {
            Some(content.to_string())
        }
    }
}
