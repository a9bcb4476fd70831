//! Command vocabulary: verbs, priorities, and the immutable command record.
//!
//! The original robot protocol carried free-form string instructions; here the
//! verb set is closed and versioned, with [`CommandVerb::Unknown`] capturing
//! anything the platform does not recognize so a typo surfaces as a rejected
//! dispatch instead of a silent no-op.

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::ids::{CommandId, RobotId, UserId};

/// Default timeout applied to commands that carry none (5 minutes).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Dispatch priority, ordered `Low < Normal < High < Critical`.
///
/// Priority is advisory ordering within a single robot's queue; it never
/// preempts an in-flight delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandPriority {
    /// Background work; first to be evicted when a queue hits its cap.
    Low,
    /// Default for user-issued commands.
    Normal,
    /// Jumps ahead of normal traffic on drain.
    High,
    /// Reserved for safety paths (emergency stop); never evicted.
    Critical,
}

impl Default for CommandPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for CommandPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Closed set of instructions a robot understands.
///
/// Mirrors the firmware protocol: drive commands, peripheral control, and a
/// configuration update. Verbs the platform does not recognize deserialize to
/// [`CommandVerb::Unknown`] and are rejected at dispatch validation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommandVerb {
    /// Drive the motors (direction and speed in the parameters).
    Move,
    /// Halt all motion.
    Stop,
    /// Sound the buzzer.
    Buzzer,
    /// Write text to the OLED display.
    Oled,
    /// Set the face expression.
    Expression,
    /// Drive the NeoPixel ring.
    NeoPixel,
    /// Pause between scripted steps.
    Wait,
    /// Push a configuration update.
    Configure,
    /// Forward-compatibility fallback for unrecognized wire verbs.
    Unknown(String),
}

impl CommandVerb {
    /// The wire name of this verb.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Move => "move",
            Self::Stop => "stop",
            Self::Buzzer => "buzzer",
            Self::Oled => "oled",
            Self::Expression => "expression",
            Self::NeoPixel => "neopixel",
            Self::Wait => "wait",
            Self::Configure => "configure",
            Self::Unknown(s) => s,
        }
    }

    /// Whether this is a verb the platform knows how to dispatch.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<&str> for CommandVerb {
    fn from(s: &str) -> Self {
        match s {
            "move" => Self::Move,
            "stop" => Self::Stop,
            "buzzer" => Self::Buzzer,
            "oled" => Self::Oled,
            "expression" => Self::Expression,
            "neopixel" => Self::NeoPixel,
            "wait" => Self::Wait,
            "configure" => Self::Configure,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl fmt::Display for CommandVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CommandVerb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CommandVerb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// A single directed instruction to one robot.
///
/// Immutable once created. A retried command is a new queue entry referencing
/// this record, never a mutation of it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RobotCommand {
    /// Unique identifier for this command.
    pub id: CommandId,
    /// Target robot.
    pub robot_id: RobotId,
    /// Instruction verb.
    pub verb: CommandVerb,
    /// Opaque parameter payload (JSON object).
    pub parameters: serde_json::Value,
    /// Dispatch priority.
    pub priority: CommandPriority,
    /// Expiry for queued delivery, in milliseconds. `None` falls back to
    /// [`DEFAULT_COMMAND_TIMEOUT`].
    pub timeout_ms: Option<u64>,
    /// User that issued the command.
    pub issued_by: UserId,
    /// Creation time (wall clock, for audit).
    pub issued_at: DateTime<Utc>,
}

impl RobotCommand {
    /// Create a command with normal priority and the default timeout.
    #[must_use]
    pub fn new(
        robot_id: RobotId,
        verb: CommandVerb,
        parameters: serde_json::Value,
        issued_by: UserId,
    ) -> Self {
        Self {
            id: CommandId::new(),
            robot_id,
            verb,
            parameters,
            priority: CommandPriority::Normal,
            timeout_ms: None,
            issued_by,
            issued_at: Utc::now(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: CommandPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set an explicit delivery timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Effective delivery timeout for this command.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout_ms
            .map_or(DEFAULT_COMMAND_TIMEOUT, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_command(verb: CommandVerb) -> RobotCommand {
        RobotCommand::new(
            RobotId::from("r1"),
            verb,
            json!({}),
            UserId::from("u1"),
        )
    }

    #[test]
    fn priority_ordering() {
        assert!(CommandPriority::Low < CommandPriority::Normal);
        assert!(CommandPriority::Normal < CommandPriority::High);
        assert!(CommandPriority::High < CommandPriority::Critical);
    }

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(CommandPriority::default(), CommandPriority::Normal);
        let cmd = make_command(CommandVerb::Move);
        assert_eq!(cmd.priority, CommandPriority::Normal);
    }

    #[test]
    fn known_verbs_round_trip() {
        for name in [
            "move",
            "stop",
            "buzzer",
            "oled",
            "expression",
            "neopixel",
            "wait",
            "configure",
        ] {
            let verb = CommandVerb::from(name);
            assert!(verb.is_recognized(), "{name} should be recognized");
            assert_eq!(verb.as_str(), name);
        }
    }

    #[test]
    fn unknown_verb_is_captured_not_lost() {
        let verb = CommandVerb::from("self_destruct");
        assert!(!verb.is_recognized());
        assert_eq!(verb.as_str(), "self_destruct");
    }

    #[test]
    fn verb_serde_uses_wire_names() {
        let json = serde_json::to_string(&CommandVerb::NeoPixel).unwrap();
        assert_eq!(json, "\"neopixel\"");
        let back: CommandVerb = serde_json::from_str("\"mvoe\"").unwrap();
        assert_eq!(back, CommandVerb::Unknown("mvoe".to_string()));
    }

    #[test]
    fn priority_serde_lowercase() {
        let json = serde_json::to_string(&CommandPriority::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let back: CommandPriority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(back, CommandPriority::Low);
    }

    #[test]
    fn default_timeout_applied() {
        let cmd = make_command(CommandVerb::Stop);
        assert_eq!(cmd.timeout(), DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn explicit_timeout_wins() {
        let cmd = make_command(CommandVerb::Stop).with_timeout(Duration::from_secs(5));
        assert_eq!(cmd.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn commands_get_unique_ids() {
        let a = make_command(CommandVerb::Move);
        let b = make_command(CommandVerb::Move);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn command_serde_round_trip() {
        let cmd = make_command(CommandVerb::Buzzer)
            .with_priority(CommandPriority::High)
            .with_timeout(Duration::from_secs(30));
        let json = serde_json::to_string(&cmd).unwrap();
        let back: RobotCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, cmd.id);
        assert_eq!(back.verb, CommandVerb::Buzzer);
        assert_eq!(back.priority, CommandPriority::High);
        assert_eq!(back.timeout_ms, Some(30_000));
    }
}
