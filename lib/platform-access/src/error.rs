//! Error types for the platform-access crate.

use std::fmt;

/// Errors from verifying a caller's credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// No bearer credential was presented.
    MissingCredential,
    /// The credential is not recognised.
    InvalidToken { reason: String },
    /// The credential is valid but its subject may not use the service.
    AccessDenied { subject: String },
}

impl AuthenticationError {
    /// Returns true if the caller is known but not allowed in.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => {
                write!(f, "missing bearer credential")
            }
            Self::InvalidToken { reason } => {
                write!(f, "invalid token: {reason}")
            }
            Self::AccessDenied { subject } => {
                write!(f, "access denied for subject: {subject}")
            }
        }
    }
}

impl std::error::Error for AuthenticationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_token_display() {
        let err = AuthenticationError::InvalidToken {
            reason: "unknown token".to_string(),
        };
        assert!(err.to_string().contains("invalid token"));
        assert!(err.to_string().contains("unknown token"));
    }

    #[test]
    fn access_denied_display_names_subject() {
        let err = AuthenticationError::AccessDenied {
            subject: "mallory".to_string(),
        };
        assert!(err.to_string().contains("mallory"));
        assert!(err.is_forbidden());
    }

    #[test]
    fn missing_credential_is_not_forbidden() {
        assert!(!AuthenticationError::MissingCredential.is_forbidden());
    }
}
