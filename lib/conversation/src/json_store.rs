//! Directory-backed conversation store.
//!
//! Each conversation lives in `<dir>/<conversation id>.json`. Saves write a
//! temporary sibling file, flush it, and rename it over the target, so a
//! reader sees either the previous or the new document, never a torn one.

use crate::conversation::Conversation;
use crate::error::StoreError;
use crate::message::MessageRole;
use crate::store::ConversationStore;
use async_trait::async_trait;
use parley_core::{ConversationId, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Conversation store persisting one JSON document per conversation.
#[derive(Debug, Clone)]
pub struct JsonDirectoryConversationStore {
    root: PathBuf,
}

impl JsonDirectoryConversationStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| StoreError::Io {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;

        debug!(root = %root.display(), "Opened conversation directory");
        Ok(Self { root })
    }

    /// Returns the directory conversations are stored in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: ConversationId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

#[async_trait]
impl ConversationStore for JsonDirectoryConversationStore {
    async fn get(&self, id: ConversationId) -> Result<Option<Conversation>, StoreError> {
        let path = self.path_for(id);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                }
                .into());
            }
        };

        let conversation: Conversation =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        if conversation.id != id {
            return Err(StoreError::Corrupt {
                path: path.display().to_string(),
                reason: format!("file holds conversation {}", conversation.id),
            }
            .into());
        }

        // Exactly one system preamble, and it comes first.
        let well_formed = match conversation.messages().split_first() {
            Some((first, rest)) => {
                first.role == MessageRole::System
                    && rest.iter().all(|m| m.role != MessageRole::System)
            }
            None => false,
        };
        if !well_formed {
            return Err(StoreError::Corrupt {
                path: path.display().to_string(),
                reason: "conversation must start with exactly one system message".to_string(),
            }
            .into());
        }

        Ok(Some(conversation))
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let path = self.path_for(conversation.id);
        let tmp_path = path.with_extension("json.tmp");

        let encoded =
            serde_json::to_vec_pretty(conversation).map_err(|e| StoreError::Serialization {
                conversation_id: conversation.id.to_string(),
                reason: e.to_string(),
            })?;

        let io_error = |p: &Path, e: std::io::Error| StoreError::Io {
            path: p.display().to_string(),
            reason: e.to_string(),
        };

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| io_error(&tmp_path, e))?;
        file.write_all(&encoded)
            .await
            .map_err(|e| io_error(&tmp_path, e))?;
        file.sync_all().await.map_err(|e| io_error(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(
            conversation_id = %conversation.id,
            message_count = conversation.message_count(),
            "Saved conversation"
        );
        Ok(())
    }
}
