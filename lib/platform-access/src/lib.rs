//! Caller identity for parley.
//!
//! This crate provides:
//! - `CallerIdentity`: the verified subject a request acts on behalf of
//! - `IdentityVerifier`: the seam to whatever issues bearer credentials
//! - `StaticTokenVerifier`: a configured token table for single-process deployments
//!
//! Credentials are issued elsewhere; this crate only checks them.
//!
//! # Example
//!
//! ```
//! use parley_platform_access::{IdentityVerifier, StaticTokenVerifier};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let verifier = StaticTokenVerifier::from_tokens([("alice", "s3cret")]);
//! let identity = verifier.verify("s3cret").await.unwrap();
//! assert_eq!(identity.subject(), "alice");
//! # }
//! ```

pub mod error;
pub mod identity;
pub mod static_token;

pub use error::AuthenticationError;
pub use identity::{CallerIdentity, IdentityVerifier};
pub use static_token::StaticTokenVerifier;
