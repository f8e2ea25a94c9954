//! Error types for the AI crate.
//!
//! `CompletionError` is the only error a provider returns. Every variant maps
//! to a stable reason code so callers can report and branch on the failure
//! without parsing messages.

use std::fmt;

/// Errors from a completion provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// The call did not finish within its time bound.
    Timeout,
    /// The provider rejected the call because of quota or rate limits.
    RateLimited { retry_after_secs: Option<u64> },
    /// The provider could not be reached.
    ProviderUnavailable { provider: String, reason: String },
    /// The provider answered with a non-success status.
    RequestFailed { status: Option<u16>, reason: String },
    /// The provider answered with a body that could not be decoded.
    MalformedResponse { reason: String },
    /// The provider answered successfully but produced no text.
    EmptyContent,
    /// The history handed to the provider is structurally unusable.
    InvalidHistory { reason: String },
    /// The provider client is misconfigured.
    InvalidConfig { reason: String },
}

impl CompletionError {
    /// Returns a stable, machine-readable code for this failure.
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::RequestFailed { .. } => "request_failed",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::EmptyContent => "empty_content",
            Self::InvalidHistory { .. } => "invalid_history",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "completion request timed out"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "completion provider rate limited, retry after {secs}s")
                } else {
                    write!(f, "completion provider rate limited")
                }
            }
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "completion provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { status, reason } => match status {
                Some(status) => write!(f, "completion request failed with HTTP {status}: {reason}"),
                None => write!(f, "completion request failed: {reason}"),
            },
            Self::MalformedResponse { reason } => {
                write!(f, "failed to parse completion response: {reason}")
            }
            Self::EmptyContent => write!(f, "completion provider returned empty content"),
            Self::InvalidHistory { reason } => {
                write!(f, "invalid conversation history: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid completion provider configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for CompletionError {}
