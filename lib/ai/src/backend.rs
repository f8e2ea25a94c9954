//! Completion provider abstraction.
//!
//! Provides a unified interface for text-generation backends. A provider
//! receives the full, ordered, role-tagged history of a conversation and
//! returns the generated reply.

use crate::error::CompletionError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Available provider flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// The hosted OpenAI API.
    #[default]
    OpenAi,
    /// Any endpoint speaking the OpenAI chat completions protocol.
    OpenAiCompatible,
    /// A local Ollama instance through its OpenAI-compatible endpoint.
    Ollama,
}

impl ProviderKind {
    /// Returns the name used in logs and error messages.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenAiCompatible => "openai_compatible",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a completion provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The provider flavour.
    #[serde(default)]
    pub kind: ProviderKind,
    /// Base URL of the API, without the `/chat/completions` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key, if the provider requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// HTTP request timeout, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// When set, only the system preamble and the most recent N messages are
    /// sent to the provider.
    #[serde(default)]
    pub max_context_messages: Option<usize>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl ProviderConfig {
    /// Creates a configuration for the hosted OpenAI API.
    #[must_use]
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Creates a configuration for a local Ollama instance.
    #[must_use]
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::Ollama,
            base_url: base_url.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Limits the history sent per request.
    #[must_use]
    pub fn with_max_context_messages(mut self, max: usize) -> Self {
        self.max_context_messages = Some(max);
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: None,
            max_tokens: None,
            timeout_seconds: default_timeout_seconds(),
            max_context_messages: None,
        }
    }
}

// Keeps the API key out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_context_messages", &self.max_context_messages)
            .finish()
    }
}

/// The role of a message sender, as understood by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System preamble.
    System,
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
}

/// A role-tagged message handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender.
    pub role: ChatRole,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with the given role.
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// A generated reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text.
    pub content: String,
    /// Model that generated the reply.
    pub model: String,
    /// Token usage statistics.
    pub usage: TokenUsage,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Trait for completion providers.
///
/// One call to `complete` is one external request. Implementations must not
/// retry on their own.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generates a reply for the given history.
    ///
    /// # Errors
    ///
    /// Returns a `CompletionError` if the history is structurally unusable or
    /// the provider call fails.
    async fn complete(&self, history: &[ChatMessage]) -> Result<Completion, CompletionError>;

    /// Returns the provider flavour.
    fn provider(&self) -> ProviderKind;

    /// Returns the model name.
    fn model(&self) -> &str;
}

/// Checks that a history is structurally well formed.
///
/// The history must start with a system preamble and contain at least one
/// user message. Role alternation is not checked.
///
/// # Errors
///
/// Returns `CompletionError::InvalidHistory` describing the first problem found.
pub fn validate_history(history: &[ChatMessage]) -> Result<(), CompletionError> {
    let Some(first) = history.first() else {
        return Err(CompletionError::InvalidHistory {
            reason: "history is empty".to_string(),
        });
    };

    if first.role != ChatRole::System {
        return Err(CompletionError::InvalidHistory {
            reason: "history must start with a system message".to_string(),
        });
    }

    if !history.iter().any(|m| m.role == ChatRole::User) {
        return Err(CompletionError::InvalidHistory {
            reason: "history contains no user message".to_string(),
        });
    }

    Ok(())
}

/// Returns the slice of history to send when the context window is bounded.
///
/// The leading system preamble is always kept; of the remaining messages only
/// the most recent `max_messages` are kept. The stored history is not touched.
#[must_use]
pub fn trim_context(history: &[ChatMessage], max_messages: Option<usize>) -> Vec<ChatMessage> {
    let Some(max) = max_messages else {
        return history.to_vec();
    };

    match history.split_first() {
        Some((preamble, rest)) if preamble.role == ChatRole::System => {
            let skip = rest.len().saturating_sub(max);
            std::iter::once(preamble)
                .chain(rest.iter().skip(skip))
                .cloned()
                .collect()
        }
        _ => {
            let skip = history.len().saturating_sub(max);
            history[skip..].to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user("one"),
            ChatMessage::assistant("1"),
            ChatMessage::user("two"),
            ChatMessage::assistant("2"),
            ChatMessage::user("three"),
        ]
    }

    #[test]
    fn validate_accepts_preamble_and_user() {
        let history = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        assert!(validate_history(&history).is_ok());
    }

    #[test]
    fn validate_rejects_empty_history() {
        let err = validate_history(&[]).unwrap_err();
        assert_eq!(err.reason_code(), "invalid_history");
    }

    #[test]
    fn validate_rejects_missing_preamble() {
        let history = vec![ChatMessage::user("hi")];
        let err = validate_history(&history).unwrap_err();
        assert!(err.to_string().contains("system"));
    }

    #[test]
    fn validate_rejects_history_without_user_message() {
        let history = vec![ChatMessage::system("sys")];
        let err = validate_history(&history).unwrap_err();
        assert!(err.to_string().contains("no user message"));
    }

    #[test]
    fn validate_does_not_enforce_alternation() {
        let history = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("first"),
            ChatMessage::user("second"),
        ];
        assert!(validate_history(&history).is_ok());
    }

    #[test]
    fn trim_context_without_limit_keeps_everything() {
        assert_eq!(trim_context(&history(), None), history());
    }

    #[test]
    fn trim_context_keeps_preamble_and_recent_messages() {
        let trimmed = trim_context(&history(), Some(2));

        assert_eq!(trimmed.len(), 3);
        assert_eq!(trimmed[0].role, ChatRole::System);
        assert_eq!(trimmed[1].content, "2");
        assert_eq!(trimmed[2].content, "three");
    }

    #[test]
    fn trim_context_with_generous_limit_is_identity() {
        assert_eq!(trim_context(&history(), Some(50)), history());
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn provider_config_debug_redacts_api_key() {
        let config = ProviderConfig::openai("sk-secret", "gpt-4o-mini");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn provider_config_defaults_from_empty_json() {
        let config: ProviderConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.kind, ProviderKind::OpenAi);
        assert_eq!(config.timeout_seconds, 30);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn chat_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("ok")).expect("serialize");
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
