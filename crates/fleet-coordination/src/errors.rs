//! Error types for the coordination core.
//!
//! Propagation policy: single-robot operations favor queue-and-retry over
//! failure, multi-robot operations favor exhaustive per-target reporting over
//! early abort. Only malformed input and authorization violations produce an
//! `Err`.

use thiserror::Error;

use fleet_core::{GroupId, UserId};

use crate::store::StoreError;

/// Errors surfaced by group, bulk, and emergency operations.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// Malformed input, rejected synchronously and never queued.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The caller may not act on the named scope. Never retried.
    #[error("user {user_id} is not authorized for {scope}")]
    Unauthorized {
        /// The calling user.
        user_id: UserId,
        /// Human-readable description of the denied scope.
        scope: String,
    },

    /// The referenced group does not exist (or is invisible to the caller).
    #[error("robot group not found: {0}")]
    GroupNotFound(GroupId),

    /// Group names are a user-scoped uniqueness key.
    #[error("a group named {0:?} already exists for this user")]
    DuplicateGroupName(String),

    /// The persistence collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for coordination operations.
pub type Result<T> = std::result::Result<T, CoordinationError>;
