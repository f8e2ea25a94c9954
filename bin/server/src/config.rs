//! Centralized server configuration.
//!
//! Loaded via the `config` crate from environment variables, with `__`
//! separating nested keys (`PROVIDER__MODEL`, `CONVERSATION__STORE__BACKEND`).
//!
//! See [`ProviderConfig`](parley_ai::ProviderConfig) for the provider keys.

use parley_ai::ProviderConfig;
use parley_conversation::{SessionConfig, UnknownConversationPolicy};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Completion provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Conversation handling configuration.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Bearer credential configuration.
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

/// Conversation-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    /// System preamble for new conversations.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Handling of unknown conversation IDs: `start_fresh` or `reject`.
    #[serde(default)]
    pub unknown_id_policy: UnknownConversationPolicy,

    /// Serialize turns per conversation.
    #[serde(default = "default_serialize_turns")]
    pub serialize_turns: bool,

    /// Upper bound on a single provider call, in seconds.
    #[serde(default = "default_completion_timeout_seconds")]
    pub completion_timeout_seconds: u64,

    /// Where conversations are kept.
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_system_prompt() -> String {
    SessionConfig::default().system_prompt
}

fn default_serialize_turns() -> bool {
    true
}

fn default_completion_timeout_seconds() -> u64 {
    SessionConfig::default().completion_timeout_seconds
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            unknown_id_policy: UnknownConversationPolicy::default(),
            serialize_turns: default_serialize_turns(),
            completion_timeout_seconds: default_completion_timeout_seconds(),
            store: StoreConfig::default(),
        }
    }
}

impl ConversationConfig {
    /// Returns the session manager settings.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            system_prompt: self.system_prompt.clone(),
            unknown_id_policy: self.unknown_id_policy,
            serialize_turns: self.serialize_turns,
            completion_timeout_seconds: self.completion_timeout_seconds,
        }
    }
}

/// Conversation store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process memory; conversations are lost on restart.
    #[default]
    Memory,
    /// One JSON file per conversation.
    JsonDirectory,
}

/// Conversation store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory for the `json_directory` backend.
    #[serde(default = "default_store_directory")]
    pub directory: PathBuf,
}

fn default_store_directory() -> PathBuf {
    PathBuf::from("data/conversations")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            directory: default_store_directory(),
        }
    }
}

/// Bearer credential configuration.
///
/// `AUTH__TOKENS__<SUBJECT>=<token>` adds a caller; subjects are lowercased
/// by the environment source. `AUTH__DENIED` is a comma-separated list of
/// subjects refused access.
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: HashMap<String, String>,

    #[serde(default)]
    pub denied: String,
}

impl AuthConfig {
    /// Returns the denied subjects.
    pub fn denied_subjects(&self) -> impl Iterator<Item = &str> {
        self.denied
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// Keeps tokens out of logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut subjects: Vec<&str> = self.tokens.keys().map(String::as_str).collect();
        subjects.sort_unstable();
        f.debug_struct("AuthConfig")
            .field("subjects", &subjects)
            .field("denied", &self.denied)
            .finish()
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
