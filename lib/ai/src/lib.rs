//! Completion provider client for parley.
//!
//! This crate provides the single-call adapter between a conversation and an
//! external text-generation API:
//!
//! - **Backend**: the `CompletionProvider` trait and the role-tagged message
//!   types it consumes
//! - **OpenAI-compatible client**: an HTTP implementation for any endpoint
//!   speaking the `/chat/completions` protocol (OpenAI, Ollama, vLLM, ...)
//!
//! The client makes exactly one external call per `complete` invocation. It
//! never caches, batches or retries; retry policy belongs to the caller.

pub mod backend;
pub mod error;
pub mod openai;

pub use backend::{
    ChatMessage, ChatRole, Completion, CompletionProvider, ProviderConfig, ProviderKind,
    TokenUsage, trim_context, validate_history,
};
pub use error::CompletionError;
pub use openai::OpenAiCompatibleProvider;
