//! Collaborator contracts: transport, notification, and authorization.
//!
//! The coordination core never talks to a socket, a push service, or an auth
//! backend directly. It consumes these trait objects; `fleet-server` provides
//! the live WebSocket transport, and the binary wires in the rest.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_core::{CommandId, CommandPriority, CommandVerb, GroupId, RobotId, UserId};

/// Result of a single transport delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The transport accepted the frame for the live session.
    Ack,
    /// The transport could not confirm the send in time.
    Timeout,
    /// The session is gone or superseded; retry against a fresh session.
    SessionInvalid,
}

/// The command payload as delivered over the transport.
///
/// This is the transport-facing projection of a `RobotCommand`; the robot
/// echoes `command_id` back in its asynchronous application-level ack.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    /// Command identifier, echoed back in the ack.
    pub command_id: CommandId,
    /// Instruction verb.
    pub verb: CommandVerb,
    /// Opaque parameters.
    pub parameters: serde_json::Value,
    /// Dispatch priority.
    pub priority: CommandPriority,
    /// Issuing user.
    pub issued_by: UserId,
    /// Issue timestamp.
    pub issued_at: DateTime<Utc>,
}

impl CommandEnvelope {
    /// Project a command into its wire envelope.
    #[must_use]
    pub fn from_command(command: &fleet_core::RobotCommand) -> Self {
        Self {
            command_id: command.id.clone(),
            verb: command.verb.clone(),
            parameters: command.parameters.clone(),
            priority: command.priority,
            issued_by: command.issued_by.clone(),
            issued_at: command.issued_at,
        }
    }
}

/// Outbound command delivery over the live transport.
#[async_trait]
pub trait TransportGateway: Send + Sync {
    /// Deliver one command envelope to the given transport session.
    ///
    /// Implementations must not block indefinitely; the dispatcher applies
    /// its own timeout on top as a backstop.
    async fn deliver(
        &self,
        session_id: &fleet_core::TransportSessionId,
        envelope: &CommandEnvelope,
    ) -> DeliveryStatus;
}

/// Severity of a user notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Informational.
    Info,
    /// Something completed as intended.
    Success,
    /// Something needs attention (robot offline, emergency stop).
    Warning,
    /// Something failed.
    Error,
}

/// Push-style user notifications (delivery mechanics live elsewhere).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notify a user. Best effort; failures are logged by implementations,
    /// never propagated into coordination flows.
    async fn notify_user(&self, user_id: &UserId, title: &str, message: &str, kind: NotificationKind);
}

/// Scope of an action for authorization checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionScope {
    /// Acting on a single robot.
    Robot(RobotId),
    /// Acting on a group.
    Group(GroupId),
    /// Acting on every robot visible to the platform (elevated).
    Fleet,
}

/// Authorization decisions, delegated to the platform's auth layer.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Whether the user exists and is active. Checked as a precondition for
    /// emergency stop, which otherwise never fails.
    async fn is_valid_user(&self, user_id: &UserId) -> bool;

    /// Whether the user may act on the given scope.
    async fn can_act(&self, user_id: &UserId, scope: &ActionScope) -> bool;
}
