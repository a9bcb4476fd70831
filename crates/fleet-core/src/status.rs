//! Robot status as reported over the transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operational status of a robot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotStatus {
    /// Connected and idle.
    Online,
    /// Connected and executing a command.
    Busy,
    /// Not connected (represented in the registry by absence).
    Offline,
    /// Connected but reporting a fault.
    Error,
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Online => "online",
            Self::Busy => "busy",
            Self::Offline => "offline",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_lowercase() {
        assert_eq!(serde_json::to_string(&RobotStatus::Busy).unwrap(), "\"busy\"");
        let back: RobotStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, RobotStatus::Error);
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(RobotStatus::Online.to_string(), "online");
        assert_eq!(RobotStatus::Offline.to_string(), "offline");
    }
}
