//! Default collaborator implementations for the server binary.
//!
//! The coordination core consumes notification and authorization through
//! traits; these are the process-level defaults. Notification delivery
//! mechanics (email, push) live outside this repository, so the notifier
//! emits structured log events for a shipper to pick up.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use fleet_coordination::{ActionScope, Authorizer, NotificationKind, Notifier, OwnershipStore};
use fleet_core::UserId;

/// Notifier that emits notifications as structured log events.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user(&self, user_id: &UserId, title: &str, message: &str, kind: NotificationKind) {
        info!(
            target: "fleet_notifications",
            user_id = %user_id,
            title,
            message,
            kind = ?kind,
            "user notification"
        );
    }
}

/// Authorizer backed by the durable ownership records.
///
/// A user may act on robots they own; users listed as admins may act on
/// anything, including fleet-wide operations.
pub struct OwnershipAuthorizer {
    ownership: Arc<dyn OwnershipStore>,
    admins: Vec<UserId>,
}

impl OwnershipAuthorizer {
    /// Create an authorizer over the ownership store.
    #[must_use]
    pub fn new(ownership: Arc<dyn OwnershipStore>, admins: Vec<UserId>) -> Self {
        Self { ownership, admins }
    }

    fn is_admin(&self, user_id: &UserId) -> bool {
        self.admins.contains(user_id)
    }
}

#[async_trait]
impl Authorizer for OwnershipAuthorizer {
    async fn is_valid_user(&self, user_id: &UserId) -> bool {
        !user_id.is_empty()
    }

    async fn can_act(&self, user_id: &UserId, scope: &ActionScope) -> bool {
        if self.is_admin(user_id) {
            return true;
        }
        match scope {
            ActionScope::Robot(robot_id) => self
                .ownership
                .owner_of(robot_id)
                .ok()
                .flatten()
                .is_some_and(|owner| owner == *user_id),
            // Non-owners never act on foreign groups; owners short-circuit
            // before this check.
            ActionScope::Group(_) => false,
            ActionScope::Fleet => false,
        }
    }
}
