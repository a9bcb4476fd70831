//! Persistence collaborator contracts.
//!
//! Group definitions and robot ownership are durable; connection state is
//! not. The coordination core reads and writes through these narrow traits
//! and `fleet-store` supplies the SQLite implementation.

use thiserror::Error;

use fleet_core::{GroupId, RobotId, UserId};

use crate::groups::RobotGroup;

/// Opaque persistence failure, carrying the operation for context.
#[derive(Debug, Error)]
#[error("store error in {operation}: {message}")]
pub struct StoreError {
    /// The store operation that failed.
    pub operation: String,
    /// Backend-specific description.
    pub message: String,
}

impl StoreError {
    /// Create a store error.
    #[must_use]
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable storage for group definitions.
pub trait GroupStore: Send + Sync {
    /// Persist a group (insert or replace by ID).
    fn save_group(&self, group: &RobotGroup) -> StoreResult<()>;

    /// Load a group by ID.
    fn load_group(&self, group_id: &GroupId) -> StoreResult<Option<RobotGroup>>;

    /// Load every group owned by a user.
    fn load_groups_for_user(&self, user_id: &UserId) -> StoreResult<Vec<RobotGroup>>;

    /// Delete a group by ID. Returns whether a row was removed.
    fn delete_group(&self, group_id: &GroupId) -> StoreResult<bool>;

    /// Total number of groups on the platform.
    fn count_groups(&self) -> StoreResult<usize>;
}

/// Durable storage for robot ownership records.
pub trait OwnershipStore: Send + Sync {
    /// The owner of a robot, if the robot is registered to anyone.
    fn owner_of(&self, robot_id: &RobotId) -> StoreResult<Option<UserId>>;

    /// Every robot owned by a user.
    fn robots_owned_by(&self, user_id: &UserId) -> StoreResult<Vec<RobotId>>;
}
