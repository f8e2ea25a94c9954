//! Conversation service for parley.
//!
//! This crate provides:
//!
//! - **Session Manager**: runs one turn of a conversation (resolve, append,
//!   call the completion provider, append the reply) with per-conversation
//!   serialization
//! - **Conversation Store**: passive keyed storage for conversation history,
//!   in memory or as a directory of JSON documents
//! - **Reporting**: the span-style interface every turn reports through

pub mod conversation;
pub mod error;
pub mod json_store;
pub mod locks;
pub mod manager;
pub mod message;
pub mod reporting;
pub mod store;

pub use conversation::Conversation;
pub use error::{AppendError, StoreError, TurnError};
pub use json_store::JsonDirectoryConversationStore;
pub use locks::ConversationLocks;
pub use manager::{SessionConfig, SessionManager, TurnReply, TurnRequest, UnknownConversationPolicy};
pub use message::{Message, MessageRole};
pub use reporting::{
    Operation, OperationReport, OperationRecord, Outcome, RecordingReporter, Reporter,
    TracingReporter,
};
pub use store::{ConversationStore, InMemoryConversationStore};
