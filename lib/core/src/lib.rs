//! Core domain types and utilities for parley.
//!
//! This crate provides the identifier types and the error handling
//! foundation shared by the conversation service and its HTTP surface.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationId, MessageId, ParseIdError};
