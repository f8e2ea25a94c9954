//! Authentication for the parley server.
//!
//! Bearer credentials are issued by an external identity service; requests
//! only present them. Verification goes through the
//! [`IdentityVerifier`](parley_platform_access::IdentityVerifier) held in
//! [`AppState`], and the verified subject becomes the conversation owner.

pub mod middleware;

use parley_conversation::SessionManager;
use parley_platform_access::IdentityVerifier;
use std::sync::Arc;

pub use middleware::{AuthRejection, RequireAuth};

/// Shared application state.
pub struct AppState {
    /// Conversation session manager.
    pub manager: SessionManager,
    /// Verifier for bearer credentials.
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(manager: SessionManager, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { manager, verifier }
    }
}
