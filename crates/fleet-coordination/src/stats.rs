//! Read-only platform statistics.

use serde::Serialize;

use fleet_core::RobotStatus;

use crate::connection::RobotConnection;

/// Point-in-time snapshot of fleet state for monitoring surfaces.
///
/// Counts only what the coordination core owns in memory; durable totals
/// (registered robots, users) belong to the web layer's database.
#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    /// Robots currently connected.
    pub connected_robots: usize,
    /// Connected robots reporting `online`.
    pub robots_online: usize,
    /// Connected robots reporting `busy`.
    pub robots_busy: usize,
    /// Connected robots reporting `error`.
    pub robots_error: usize,
    /// Commands waiting in per-robot queues.
    pub queued_commands: usize,
    /// Robot groups on the platform.
    pub robot_groups: usize,
}

impl PlatformStats {
    /// Build a snapshot from a registry snapshot plus queue and group counts.
    #[must_use]
    pub fn from_parts(
        connections: &[RobotConnection],
        queued_commands: usize,
        robot_groups: usize,
    ) -> Self {
        let mut stats = Self {
            connected_robots: connections.len(),
            queued_commands,
            robot_groups,
            ..Self::default()
        };
        for connection in connections {
            match connection.status {
                RobotStatus::Online => stats.robots_online += 1,
                RobotStatus::Busy => stats.robots_busy += 1,
                RobotStatus::Error => stats.robots_error += 1,
                RobotStatus::Offline => {}
            }
        }
        stats
    }
}
