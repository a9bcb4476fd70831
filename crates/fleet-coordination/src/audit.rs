//! In-memory dispatch audit trail.
//!
//! Every dispatch attempt lands here with its outcome — delivered, queued,
//! rejected, failed, expired — plus the asynchronous application-level ack
//! when the robot confirms execution. The trail is a bounded ring; connection
//! state is deliberately non-durable, and so is its audit.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use fleet_core::{CommandId, RobotCommand, RobotId};

/// Terminal (or confirming) outcome of one dispatch attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    /// The transport acknowledged the send.
    Delivered,
    /// Stored in the robot's queue for later delivery.
    Queued,
    /// Failed validation; never queued.
    Rejected,
    /// Exhausted the retry budget.
    Failed,
    /// Timed out in the queue or was evicted by the cap.
    Expired,
    /// The robot confirmed execution (application-level ack).
    Acknowledged,
}

/// One audit record.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchRecord {
    /// The command this attempt belongs to.
    pub command_id: CommandId,
    /// Target robot.
    pub robot_id: RobotId,
    /// Wire name of the verb.
    pub verb: String,
    /// What happened.
    pub outcome: DispatchOutcome,
    /// Optional human-readable detail (rejection reason, failure cause).
    pub detail: Option<String>,
    /// When the attempt was recorded.
    pub at: DateTime<Utc>,
}

/// Bounded ring of dispatch records.
pub struct DispatchAudit {
    entries: Mutex<VecDeque<DispatchRecord>>,
    capacity: usize,
}

impl DispatchAudit {
    /// Create an audit trail retaining up to `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            capacity: capacity.max(1),
        }
    }

    /// Record an attempt outcome for a command.
    pub fn record(&self, command: &RobotCommand, outcome: DispatchOutcome, detail: Option<String>) {
        self.push(DispatchRecord {
            command_id: command.id.clone(),
            robot_id: command.robot_id.clone(),
            verb: command.verb.as_str().to_owned(),
            outcome,
            detail,
            at: Utc::now(),
        });
    }

    /// Record the robot's asynchronous application-level ack.
    ///
    /// Returns whether the command was known to the trail (an ack for an
    /// unknown command is still recorded against the raw IDs).
    pub fn record_ack(&self, robot_id: &RobotId, command_id: &CommandId) -> bool {
        let known_verb = {
            let entries = self.entries.lock();
            entries
                .iter()
                .rev()
                .find(|record| &record.command_id == command_id)
                .map(|record| record.verb.clone())
        };
        let known = known_verb.is_some();
        self.push(DispatchRecord {
            command_id: command_id.clone(),
            robot_id: robot_id.clone(),
            verb: known_verb.unwrap_or_default(),
            outcome: DispatchOutcome::Acknowledged,
            detail: None,
            at: Utc::now(),
        });
        known
    }

    /// The most recent `limit` records, newest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<DispatchRecord> {
        let entries = self.entries.lock();
        entries.iter().rev().take(limit).cloned().collect()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the trail is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn push(&self, record: DispatchRecord) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            let _ = entries.pop_front();
        }
        entries.push_back(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{CommandVerb, UserId};
    use serde_json::json;

    fn command(robot: &str) -> RobotCommand {
        RobotCommand::new(
            RobotId::from(robot),
            CommandVerb::Move,
            json!({}),
            UserId::from("u1"),
        )
    }

    #[test]
    fn records_are_retained_newest_first() {
        let audit = DispatchAudit::new(8);
        let a = command("r1");
        let b = command("r2");
        audit.record(&a, DispatchOutcome::Queued, None);
        audit.record(&b, DispatchOutcome::Delivered, None);

        let recent = audit.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].command_id, b.id);
        assert_eq!(recent[1].command_id, a.id);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let audit = DispatchAudit::new(2);
        let first = command("r1");
        audit.record(&first, DispatchOutcome::Queued, None);
        audit.record(&command("r2"), DispatchOutcome::Queued, None);
        audit.record(&command("r3"), DispatchOutcome::Queued, None);
        assert_eq!(audit.len(), 2);
        assert!(audit.recent(2).iter().all(|r| r.command_id != first.id));
    }

    #[test]
    fn ack_for_known_command_reuses_verb() {
        let audit = DispatchAudit::new(8);
        let cmd = command("r1");
        audit.record(&cmd, DispatchOutcome::Delivered, None);
        assert!(audit.record_ack(&cmd.robot_id, &cmd.id));
        let recent = audit.recent(1);
        assert_eq!(recent[0].outcome, DispatchOutcome::Acknowledged);
        assert_eq!(recent[0].verb, "move");
    }

    #[test]
    fn ack_for_unknown_command_is_still_recorded() {
        let audit = DispatchAudit::new(8);
        let unknown = CommandId::new();
        assert!(!audit.record_ack(&RobotId::from("r1"), &unknown));
        assert_eq!(audit.len(), 1);
    }

    #[test]
    fn detail_is_preserved() {
        let audit = DispatchAudit::new(8);
        let cmd = command("r1");
        audit.record(
            &cmd,
            DispatchOutcome::Rejected,
            Some("unrecognized verb".into()),
        );
        assert_eq!(
            audit.recent(1)[0].detail.as_deref(),
            Some("unrecognized verb")
        );
    }
}
