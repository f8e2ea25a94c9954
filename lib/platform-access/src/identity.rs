//! Verified caller identity.

use crate::error::AuthenticationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The subject a request acts on behalf of, after verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    subject: String,
}

impl CallerIdentity {
    /// Creates an identity for a verified subject.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }

    /// Returns the subject identifier.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Checks bearer credentials issued by an external identity service.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies a bearer token and returns the caller it belongs to.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationError::InvalidToken` for unknown or malformed
    /// tokens and `AuthenticationError::AccessDenied` for known callers that
    /// are not allowed to use the service.
    async fn verify(&self, token: &str) -> Result<CallerIdentity, AuthenticationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_exposes_subject() {
        let identity = CallerIdentity::new("alice");
        assert_eq!(identity.subject(), "alice");
    }
}
