//! Wire frames exchanged with robots over the WebSocket transport.

use serde::{Deserialize, Serialize};

use fleet_core::{CommandId, RobotId, RobotStatus};
use fleet_coordination::CommandEnvelope;

/// Frames a robot sends to the platform.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RobotFrame {
    /// First frame after connect: identifies the robot.
    Hello {
        /// Stable robot identity.
        #[serde(rename = "robotId")]
        robot_id: RobotId,
        /// Capability descriptor.
        #[serde(default)]
        capabilities: serde_json::Value,
        /// Configuration descriptor.
        #[serde(default)]
        configuration: serde_json::Value,
    },
    /// Periodic liveness signal, optionally carrying a status change.
    Heartbeat {
        /// New reported status, if any.
        #[serde(default)]
        status: Option<RobotStatus>,
    },
    /// Explicit status update outside the heartbeat cadence.
    Status {
        /// Reported status.
        status: RobotStatus,
    },
    /// Application-level confirmation that a command executed.
    Ack {
        /// The command being confirmed.
        #[serde(rename = "commandId")]
        command_id: CommandId,
    },
}

/// Frames the platform sends to a robot.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame<'a> {
    /// Session established; the robot should proceed with `hello`.
    Connected {
        /// Assigned transport session ID.
        #[serde(rename = "sessionId")]
        session_id: &'a str,
    },
    /// A command to execute.
    Command {
        /// The command envelope.
        #[serde(flatten)]
        envelope: &'a CommandEnvelope,
    },
    /// The robot sent something unusable.
    Error {
        /// Description of the problem.
        message: &'a str,
    },
}
