//! Error types for the conversation crate.
//!
//! Errors are layered:
//! - `AppendError`: a message was refused by the conversation itself
//! - `StoreError`: the backing store failed (wrapped in a rootcause `Report`)
//! - `TurnError`: what a single turn reports to its caller

use crate::message::MessageRole;
use parley_ai::CompletionError;
use std::fmt;

/// Errors from appending to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    /// The system preamble is fixed when the conversation is created.
    SystemAfterCreation,
    /// User and assistant messages must carry text.
    EmptyContent { role: MessageRole },
}

impl fmt::Display for AppendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemAfterCreation => {
                write!(f, "system message can only be the first message")
            }
            Self::EmptyContent { role } => {
                write!(f, "{role:?} message content must not be empty")
            }
        }
    }
}

impl std::error::Error for AppendError {}

/// Errors from conversation store operations.
///
/// The in-memory store never produces these; durable backings surface them
/// so persistence failures stay distinct from validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Reading or writing the backing storage failed.
    Io { path: String, reason: String },
    /// A conversation could not be encoded for storage.
    Serialization { conversation_id: String, reason: String },
    /// Stored data could not be decoded.
    Corrupt { path: String, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => {
                write!(f, "conversation storage I/O failed at {path}: {reason}")
            }
            Self::Serialization {
                conversation_id,
                reason,
            } => {
                write!(f, "failed to encode conversation {conversation_id}: {reason}")
            }
            Self::Corrupt { path, reason } => {
                write!(f, "stored conversation at {path} is corrupt: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from handling a single turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    /// The inbound message was malformed or empty. Nothing was mutated.
    Validation { reason: String },
    /// The supplied conversation id is unknown and the policy rejects it.
    NotFound { conversation_id: String },
    /// The completion provider failed. The user message stays recorded.
    Completion(CompletionError),
    /// The conversation store failed.
    Store { reason: String },
}

impl TurnError {
    /// Returns the error type recorded on the turn's span.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found_error",
            Self::Completion(_) => "completion_error",
            Self::Store { .. } => "store_error",
        }
    }
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { reason } => write!(f, "invalid message: {reason}"),
            Self::NotFound { conversation_id } => {
                write!(f, "conversation not found: {conversation_id}")
            }
            Self::Completion(err) => write!(f, "completion failed ({}): {err}", err.reason_code()),
            Self::Store { reason } => write!(f, "conversation store failed: {reason}"),
        }
    }
}

impl std::error::Error for TurnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Completion(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CompletionError> for TurnError {
    fn from(err: CompletionError) -> Self {
        Self::Completion(err)
    }
}

impl From<AppendError> for TurnError {
    fn from(err: AppendError) -> Self {
        Self::Validation {
            reason: err.to_string(),
        }
    }
}

impl From<rootcause::Report<StoreError>> for TurnError {
    fn from(report: rootcause::Report<StoreError>) -> Self {
        Self::Store {
            reason: report.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_error_display() {
        let err = AppendError::EmptyContent {
            role: MessageRole::User,
        };
        assert!(err.to_string().contains("User"));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::Io {
            path: "/data/conv_1.json".to_string(),
            reason: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/data/conv_1.json"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn turn_error_completion_includes_reason_code() {
        let err = TurnError::from(CompletionError::Timeout);
        assert_eq!(err.kind(), "completion_error");
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn store_report_converts_to_turn_error() {
        let report: rootcause::Report<StoreError> = StoreError::Corrupt {
            path: "x.json".to_string(),
            reason: "eof".to_string(),
        }
        .into();

        let err = TurnError::from(report);

        assert_eq!(err.kind(), "store_error");
        assert!(err.to_string().contains("x.json"));
    }
}
