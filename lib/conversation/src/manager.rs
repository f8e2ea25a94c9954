//! Conversation session manager.
//!
//! The manager runs one turn at a time per conversation:
//!
//! ```text
//! Received -> Resolving-Conversation -> Appending-User-Message -> Calling-Provider
//!     -> Success: Appending-Reply -> Returning
//!     -> Failure: Returning-Error
//! ```
//!
//! The user message is saved before the provider is called and is never
//! rolled back, so a failed turn leaves the conversation one message longer
//! and a retried turn resends it as context.

use crate::conversation::Conversation;
use crate::error::TurnError;
use crate::locks::{ConversationGuard, ConversationLocks};
use crate::message::Message;
use crate::reporting::{Operation, OperationReport, Reporter};
use crate::store::ConversationStore;
use parley_ai::{CompletionError, CompletionProvider};
use parley_core::ConversationId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info};

/// What to do when a caller supplies a conversation ID that cannot be used.
///
/// An ID is unusable when it does not parse, names no stored conversation,
/// or names a conversation owned by a different caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownConversationPolicy {
    /// Start a new conversation under a newly generated ID.
    #[default]
    StartFresh,
    /// Fail the turn with `TurnError::NotFound`.
    Reject,
}

/// Session manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// System preamble placed at the start of every new conversation.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Handling of unusable conversation IDs.
    #[serde(default)]
    pub unknown_id_policy: UnknownConversationPolicy,

    /// Serialize turns per conversation.
    /// Disabling this lets concurrent turns on one conversation overwrite
    /// each other's messages.
    #[serde(default = "default_serialize_turns")]
    pub serialize_turns: bool,

    /// Upper bound on a single provider call, in seconds.
    #[serde(default = "default_completion_timeout_seconds")]
    pub completion_timeout_seconds: u64,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_serialize_turns() -> bool {
    true
}

fn default_completion_timeout_seconds() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            unknown_id_policy: UnknownConversationPolicy::default(),
            serialize_turns: default_serialize_turns(),
            completion_timeout_seconds: default_completion_timeout_seconds(),
        }
    }
}

impl SessionConfig {
    /// Returns the provider call bound.
    #[must_use]
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_seconds)
    }
}

/// One inbound turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    /// The caller's message.
    pub message: String,
    /// Conversation to continue; `None` starts a new one.
    pub conversation_id: Option<String>,
    /// Subject of the verified caller.
    pub owner: Option<String>,
}

impl TurnRequest {
    /// Creates a request that starts a new conversation.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            owner: None,
        }
    }

    /// Continues an existing conversation.
    #[must_use]
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Attributes the turn to a verified caller.
    #[must_use]
    pub fn owned_by(mut self, subject: impl Into<String>) -> Self {
        self.owner = Some(subject.into());
        self
    }
}

/// The result of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// The generated reply.
    pub reply: String,
    /// The conversation the turn was recorded in.
    pub conversation_id: ConversationId,
}

/// Orchestrates conversation turns.
pub struct SessionManager {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn CompletionProvider>,
    reporter: Arc<dyn Reporter>,
    locks: Option<ConversationLocks>,
    config: SessionConfig,
}

impl SessionManager {
    /// Creates a session manager.
    #[must_use]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn CompletionProvider>,
        reporter: Arc<dyn Reporter>,
        config: SessionConfig,
    ) -> Self {
        let locks = config.serialize_turns.then(ConversationLocks::new);
        Self {
            store,
            provider,
            reporter,
            locks,
            config,
        }
    }

    /// Returns the manager's configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handles one turn: records the message, asks the provider for a reply,
    /// and records the reply.
    ///
    /// # Errors
    ///
    /// - `TurnError::Validation` if the message is blank; nothing is mutated.
    /// - `TurnError::NotFound` if the ID is unusable and the policy rejects it.
    /// - `TurnError::Completion` if the provider fails; the user message stays.
    /// - `TurnError::Store` if the store fails.
    pub async fn handle(&self, request: TurnRequest) -> Result<TurnReply, TurnError> {
        let mut turn = self.reporter.start(Operation::Turn);
        let span = turn.span();

        let result = self.run_turn(turn.as_mut(), request).instrument(span).await;

        match &result {
            Ok(reply) => {
                turn.annotate("reply_chars", reply.reply.chars().count().to_string());
                turn.finish();
            }
            Err(err) => turn.fail(err.kind(), &err.to_string()),
        }

        result
    }

    /// Returns a conversation if `caller` may read it.
    ///
    /// Unparseable, unknown and foreign IDs all yield `None`.
    ///
    /// # Errors
    ///
    /// Returns `TurnError::Store` if the store fails.
    pub async fn conversation(
        &self,
        conversation_id: &str,
        caller: Option<&str>,
    ) -> Result<Option<Conversation>, TurnError> {
        let Ok(id) = conversation_id.trim().parse::<ConversationId>() else {
            return Ok(None);
        };

        let conversation = self.store.get(id).await?;
        Ok(conversation.filter(|c| c.is_accessible_by(caller)))
    }

    async fn run_turn(
        &self,
        turn: &mut dyn OperationReport,
        request: TurnRequest,
    ) -> Result<TurnReply, TurnError> {
        if request.message.trim().is_empty() {
            return Err(TurnError::Validation {
                reason: "message must not be empty".to_string(),
            });
        }

        let (mut conversation, _guard) = self
            .resolve(request.conversation_id.as_deref(), request.owner)
            .await?;

        turn.annotate("conversation_id", conversation.id.to_string());
        turn.annotate("message_count", conversation.message_count().to_string());

        conversation.append(Message::user(request.message))?;
        self.store.save(&conversation).await?;

        let reply = self.call_provider(&*turn, &conversation).await?;

        conversation.append(Message::assistant(reply.clone()))?;
        self.store.save(&conversation).await?;

        info!(
            conversation_id = %conversation.id,
            message_count = conversation.message_count(),
            "Turn completed"
        );

        Ok(TurnReply {
            reply,
            conversation_id: conversation.id,
        })
    }

    /// Finds the conversation a turn belongs to, creating one if needed, and
    /// takes its lock.
    async fn resolve(
        &self,
        requested: Option<&str>,
        owner: Option<String>,
    ) -> Result<(Conversation, Option<ConversationGuard<'_>>), TurnError> {
        let requested = requested.map(str::trim).filter(|raw| !raw.is_empty());

        if let Some(raw) = requested {
            match raw.parse::<ConversationId>() {
                Ok(id) => {
                    let guard = self.lock(id).await;
                    if let Some(existing) = self.store.get(id).await?
                        && existing.is_accessible_by(owner.as_deref())
                    {
                        return Ok((existing, guard));
                    }
                }
                Err(e) => debug!(error = %e, requested = raw, "Unparseable conversation id"),
            }

            match self.config.unknown_id_policy {
                UnknownConversationPolicy::Reject => {
                    return Err(TurnError::NotFound {
                        conversation_id: raw.to_string(),
                    });
                }
                UnknownConversationPolicy::StartFresh => {
                    info!(requested = raw, "Unknown conversation id, starting a new conversation");
                }
            }
        }

        let conversation = self
            .store
            .create(&self.config.system_prompt, owner)
            .await?;
        let guard = self.lock(conversation.id).await;

        debug!(conversation_id = %conversation.id, "Created conversation");
        Ok((conversation, guard))
    }

    async fn lock(&self, id: ConversationId) -> Option<ConversationGuard<'_>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(id).await),
            None => None,
        }
    }

    async fn call_provider(
        &self,
        turn: &dyn OperationReport,
        conversation: &Conversation,
    ) -> Result<String, CompletionError> {
        let mut report = turn.child(Operation::Completion);
        report.annotate("provider", self.provider.provider().to_string());
        report.annotate("model", self.provider.model().to_string());
        report.annotate("history_len", conversation.message_count().to_string());

        let history = conversation.history();
        let call = tokio::time::timeout(
            self.config.completion_timeout(),
            self.provider.complete(&history),
        );

        let result = match call.instrument(report.span()).await {
            Ok(Ok(completion)) if completion.content.trim().is_empty() => {
                Err(CompletionError::EmptyContent)
            }
            Ok(Ok(completion)) => Ok(completion.content),
            Ok(Err(err)) => Err(err),
            Err(_elapsed) => Err(CompletionError::Timeout),
        };

        match &result {
            Ok(_) => report.finish(),
            Err(err) => report.fail(err.reason_code(), &err.to_string()),
        }

        result
    }
}
