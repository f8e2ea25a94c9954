//! parley HTTP server.
//!
//! Exposes the conversation session manager over a small JSON API:
//! - `POST /chat`: run one conversation turn
//! - `GET /conversations/{id}`: read back the caller's own history
//! - `GET /health`: liveness

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

pub use auth::AppState;
pub use routes::router;
