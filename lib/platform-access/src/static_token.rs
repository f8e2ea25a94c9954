//! Token-table identity verifier.
//!
//! Tokens come from configuration (`AUTH__TOKENS__<SUBJECT>=<token>`).
//! Subjects listed as denied keep valid tokens but are refused access.

use crate::error::AuthenticationError;
use crate::identity::{CallerIdentity, IdentityVerifier};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Verifier backed by a fixed `subject -> token` table.
#[derive(Clone, Default)]
pub struct StaticTokenVerifier {
    entries: Vec<(String, Vec<u8>)>,
    denied: HashSet<String>,
}

impl StaticTokenVerifier {
    /// Builds a verifier from `(subject, token)` pairs.
    #[must_use]
    pub fn from_tokens<S, T>(tokens: impl IntoIterator<Item = (S, T)>) -> Self
    where
        S: Into<String>,
        T: AsRef<str>,
    {
        let mut entries: Vec<(String, Vec<u8>)> = tokens
            .into_iter()
            .map(|(subject, token)| (subject.into(), token.as_ref().as_bytes().to_vec()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            entries,
            denied: HashSet::new(),
        }
    }

    /// Refuses access to the given subjects even when their token matches.
    #[must_use]
    pub fn with_denied<S: Into<String>>(mut self, subjects: impl IntoIterator<Item = S>) -> Self {
        self.denied.extend(subjects.into_iter().map(Into::into));
        self
    }

    /// Returns the number of configured subjects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no subject is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<HashMap<String, String>> for StaticTokenVerifier {
    fn from(tokens: HashMap<String, String>) -> Self {
        Self::from_tokens(tokens)
    }
}

impl std::fmt::Debug for StaticTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subjects: Vec<&str> = self.entries.iter().map(|(s, _)| s.as_str()).collect();
        f.debug_struct("StaticTokenVerifier")
            .field("subjects", &subjects)
            .field("denied", &self.denied)
            .finish()
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<CallerIdentity, AuthenticationError> {
        if token.is_empty() {
            return Err(AuthenticationError::MissingCredential);
        }

        let presented = token.as_bytes();
        let mut matched: Option<&str> = None;
        // Every entry is compared so timing does not reveal which one matched.
        for (subject, expected) in &self.entries {
            if constant_time_eq(expected, presented) && matched.is_none() {
                matched = Some(subject.as_str());
            }
        }

        match matched {
            Some(subject) if self.denied.contains(subject) => {
                Err(AuthenticationError::AccessDenied {
                    subject: subject.to_string(),
                })
            }
            Some(subject) => {
                debug!(subject, "Verified bearer token");
                Ok(CallerIdentity::new(subject))
            }
            None => Err(AuthenticationError::InvalidToken {
                reason: "token not recognised".to_string(),
            }),
        }
    }
}
