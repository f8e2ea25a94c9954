//! Error types for the server.
//!
//! `ApiError` is what handlers return; every variant renders as
//! `{ "error": "..." }` with a matching status code. `StartupError` covers
//! everything that can stop the process before it starts serving.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parley_ai::CompletionError;
use parley_conversation::{StoreError, TurnError};
use serde::Serialize;
use std::fmt;
use tracing::error;

/// JSON error payload.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Errors returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The request body was malformed or the message was blank.
    BadRequest { reason: String },
    /// The conversation does not exist or belongs to someone else.
    NotFound { conversation_id: String },
    /// The turn failed after it was accepted.
    Internal { reason: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest { reason } => write!(f, "{reason}"),
            Self::NotFound { conversation_id } => {
                write!(f, "conversation '{conversation_id}' not found")
            }
            Self::Internal { reason } => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::Validation { reason } => Self::BadRequest { reason },
            TurnError::NotFound { conversation_id } => Self::NotFound { conversation_id },
            TurnError::Completion(e) => Self::Internal {
                reason: format!("completion failed: {e}"),
            },
            TurnError::Store { reason } => {
                error!(reason, "Conversation store failure");
                Self::Internal {
                    reason: "conversation storage failed".to_string(),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

/// Errors that prevent the server from starting.
#[derive(Debug)]
pub enum StartupError {
    /// Configuration could not be loaded.
    Config(config::ConfigError),
    /// The completion provider could not be constructed.
    Provider(CompletionError),
    /// The conversation store could not be opened.
    Store(String),
    /// The listening socket could not be bound.
    Bind { address: String, reason: String },
    /// The server stopped with an I/O error.
    Serve(std::io::Error),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "failed to load configuration: {e}"),
            Self::Provider(e) => write!(f, "failed to configure provider: {e}"),
            Self::Store(reason) => write!(f, "failed to open conversation store: {reason}"),
            Self::Bind { address, reason } => {
                write!(f, "failed to bind to {address}: {reason}")
            }
            Self::Serve(e) => write!(f, "server error: {e}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Provider(e) => Some(e),
            Self::Serve(e) => Some(e),
            Self::Store(_) | Self::Bind { .. } => None,
        }
    }
}

impl From<config::ConfigError> for StartupError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<CompletionError> for StartupError {
    fn from(err: CompletionError) -> Self {
        Self::Provider(err)
    }
}

impl From<rootcause::Report<StoreError>> for StartupError {
    fn from(report: rootcause::Report<StoreError>) -> Self {
        Self::Store(report.to_string())
    }
}
