//! Per-robot pending-command backlog.
//!
//! Each robot's queue is ordered by (priority desc, enqueue time asc): a
//! `critical` stop enqueued after two `low` movement commands is delivered
//! first when the robot reconnects. Supersession is exactly that ordering —
//! lower-priority entries are never deleted to make way, they just wait.
//!
//! The queue owns entry lifetime: an entry leaves only on confirmed delivery,
//! on exhausting the retry budget, on expiry, or through cap eviction — each
//! exit is reported to the caller, never silent.

use std::collections::VecDeque;
use std::time::Instant;

use dashmap::DashMap;

use fleet_core::{CommandPriority, RobotCommand, RobotId};

/// A queued command plus delivery bookkeeping.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    /// The immutable command. A retry reuses this entry; it never mutates the
    /// command itself.
    pub command: RobotCommand,
    /// Delivery attempts made so far.
    pub attempts: u32,
    /// When the entry was enqueued (monotonic).
    pub enqueued_at: Instant,
    /// When delivery was last attempted.
    pub last_attempt: Option<Instant>,
}

impl QueueEntry {
    fn new(command: RobotCommand) -> Self {
        Self {
            command,
            attempts: 0,
            enqueued_at: Instant::now(),
            last_attempt: None,
        }
    }

    /// Whether the entry has outlived its command's timeout.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.enqueued_at.elapsed() > self.command.timeout()
    }

    /// Record a delivery attempt.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
        self.last_attempt = Some(Instant::now());
    }
}

/// Outcome of an `enqueue` call.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// Accepted; `depth` is the queue length afterwards.
    Enqueued {
        /// Queue depth after the insert.
        depth: usize,
    },
    /// Accepted, but the cap forced out the oldest lowest-priority entry.
    Evicted {
        /// The command that was expired to make room.
        expired: RobotCommand,
        /// Queue depth after the insert.
        depth: usize,
    },
    /// The queue is full of entries that outrank the incoming command, which
    /// is expired instead (a `critical` entry is never the one to go).
    Dropped {
        /// The incoming command, returned for expiry reporting.
        expired: RobotCommand,
    },
}

/// All per-robot command queues, sharded by robot ID.
pub struct CommandQueue {
    queues: DashMap<RobotId, VecDeque<QueueEntry>>,
    cap: usize,
}

impl CommandQueue {
    /// Create with the given per-robot depth cap (minimum 1).
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            queues: DashMap::new(),
            cap: cap.max(1),
        }
    }

    /// Append a command to its robot's queue in priority-then-FIFO position.
    pub fn enqueue(&self, command: RobotCommand) -> EnqueueOutcome {
        let robot_id = command.robot_id.clone();
        let mut queue = self.queues.entry(robot_id).or_default();

        if queue.len() >= self.cap {
            let lowest = queue
                .iter()
                .map(|entry| entry.command.priority)
                .min()
                .unwrap_or(CommandPriority::Critical);

            if lowest == CommandPriority::Critical {
                // Critical entries are never evicted. A critical incoming
                // command is admitted over cap; anything else is expired.
                if command.priority != CommandPriority::Critical {
                    return EnqueueOutcome::Dropped { expired: command };
                }
                insert_ordered(&mut queue, QueueEntry::new(command));
                return EnqueueOutcome::Enqueued { depth: queue.len() };
            }

            if command.priority < lowest {
                // The incoming command is the lowest priority in sight.
                return EnqueueOutcome::Dropped { expired: command };
            }

            // Oldest entry of the lowest priority: queues are sorted by
            // priority desc then FIFO, so that is the first entry at `lowest`.
            let victim_index = queue
                .iter()
                .position(|entry| entry.command.priority == lowest)
                .unwrap_or(queue.len() - 1);
            let victim = queue.remove(victim_index);
            insert_ordered(&mut queue, QueueEntry::new(command));
            let depth = queue.len();
            return match victim {
                Some(entry) => EnqueueOutcome::Evicted {
                    expired: entry.command,
                    depth,
                },
                None => EnqueueOutcome::Enqueued { depth },
            };
        }

        insert_ordered(&mut queue, QueueEntry::new(command));
        EnqueueOutcome::Enqueued { depth: queue.len() }
    }

    /// Remove and return the head entry (highest priority, oldest).
    pub fn pop_front(&self, robot_id: &RobotId) -> Option<QueueEntry> {
        self.queues.get_mut(robot_id)?.pop_front()
    }

    /// Put a popped entry back at the head after a failed delivery.
    pub fn requeue_front(&self, entry: QueueEntry) {
        let robot_id = entry.command.robot_id.clone();
        self.queues.entry(robot_id).or_default().push_front(entry);
    }

    /// Remove and return every expired entry for a robot.
    pub fn take_expired(&self, robot_id: &RobotId) -> Vec<QueueEntry> {
        let Some(mut queue) = self.queues.get_mut(robot_id) else {
            return Vec::new();
        };
        let mut expired = Vec::new();
        let mut index = 0;
        while index < queue.len() {
            if queue[index].is_expired() {
                if let Some(entry) = queue.remove(index) {
                    expired.push(entry);
                }
            } else {
                index += 1;
            }
        }
        expired
    }

    /// Pending commands for one robot.
    #[must_use]
    pub fn depth(&self, robot_id: &RobotId) -> usize {
        self.queues.get(robot_id).map_or(0, |q| q.len())
    }

    /// Pending commands across every robot.
    #[must_use]
    pub fn total_pending(&self) -> usize {
        self.queues.iter().map(|entry| entry.value().len()).sum()
    }

    /// Robot IDs that currently have pending commands.
    #[must_use]
    pub fn robots_with_pending(&self) -> Vec<RobotId> {
        self.queues
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }
}

/// Insert in (priority desc, enqueue asc) position: after every entry of the
/// same or higher priority, before the first strictly-lower one.
fn insert_ordered(queue: &mut VecDeque<QueueEntry>, entry: QueueEntry) {
    let position = queue
        .iter()
        .position(|existing| existing.command.priority < entry.command.priority)
        .unwrap_or(queue.len());
    queue.insert(position, entry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{CommandVerb, UserId};
    use serde_json::json;
    use std::time::Duration;

    fn command(robot: &str, verb: CommandVerb, priority: CommandPriority) -> RobotCommand {
        RobotCommand::new(
            RobotId::from(robot),
            verb,
            json!({}),
            UserId::from("u1"),
        )
        .with_priority(priority)
    }

    #[test]
    fn fifo_within_priority() {
        let queue = CommandQueue::new(16);
        let first = command("r1", CommandVerb::Move, CommandPriority::Normal);
        let second = command("r1", CommandVerb::Buzzer, CommandPriority::Normal);
        let first_id = first.id.clone();
        let second_id = second.id.clone();
        let _ = queue.enqueue(first);
        let _ = queue.enqueue(second);

        let robot = RobotId::from("r1");
        assert_eq!(queue.pop_front(&robot).unwrap().command.id, first_id);
        assert_eq!(queue.pop_front(&robot).unwrap().command.id, second_id);
    }

    #[test]
    fn critical_jumps_ahead_of_queued_low() {
        let queue = CommandQueue::new(16);
        let _ = queue.enqueue(command("r1", CommandVerb::Move, CommandPriority::Low));
        let _ = queue.enqueue(command("r1", CommandVerb::Move, CommandPriority::Low));
        let stop = command("r1", CommandVerb::Stop, CommandPriority::Critical);
        let stop_id = stop.id.clone();
        let _ = queue.enqueue(stop);

        let robot = RobotId::from("r1");
        assert_eq!(queue.pop_front(&robot).unwrap().command.id, stop_id);
        assert_eq!(queue.depth(&robot), 2);
    }

    #[test]
    fn cap_evicts_oldest_lowest_priority() {
        let queue = CommandQueue::new(2);
        let oldest_low = command("r1", CommandVerb::Move, CommandPriority::Low);
        let oldest_low_id = oldest_low.id.clone();
        let _ = queue.enqueue(oldest_low);
        let _ = queue.enqueue(command("r1", CommandVerb::Move, CommandPriority::Low));

        let outcome = queue.enqueue(command("r1", CommandVerb::Stop, CommandPriority::High));
        match outcome {
            EnqueueOutcome::Evicted { expired, depth } => {
                assert_eq!(expired.id, oldest_low_id);
                assert_eq!(depth, 2);
            }
            other => panic!("expected eviction, got {other:?}"),
        }
    }

    #[test]
    fn cap_never_evicts_critical_while_low_exists() {
        let queue = CommandQueue::new(2);
        let _ = queue.enqueue(command("r1", CommandVerb::Stop, CommandPriority::Critical));
        let _ = queue.enqueue(command("r1", CommandVerb::Move, CommandPriority::Low));

        let outcome = queue.enqueue(command("r1", CommandVerb::Buzzer, CommandPriority::Normal));
        match outcome {
            EnqueueOutcome::Evicted { expired, .. } => {
                assert_eq!(expired.priority, CommandPriority::Low);
            }
            other => panic!("expected eviction of the low entry, got {other:?}"),
        }
    }

    #[test]
    fn incoming_low_into_full_normal_queue_is_dropped() {
        let queue = CommandQueue::new(2);
        let _ = queue.enqueue(command("r1", CommandVerb::Move, CommandPriority::Normal));
        let _ = queue.enqueue(command("r1", CommandVerb::Move, CommandPriority::Normal));

        let incoming = command("r1", CommandVerb::Wait, CommandPriority::Low);
        let incoming_id = incoming.id.clone();
        match queue.enqueue(incoming) {
            EnqueueOutcome::Dropped { expired } => assert_eq!(expired.id, incoming_id),
            other => panic!("expected drop of the incoming low command, got {other:?}"),
        }
        assert_eq!(queue.depth(&RobotId::from("r1")), 2);
    }

    #[test]
    fn all_critical_queue_admits_critical_over_cap() {
        let queue = CommandQueue::new(2);
        let _ = queue.enqueue(command("r1", CommandVerb::Stop, CommandPriority::Critical));
        let _ = queue.enqueue(command("r1", CommandVerb::Stop, CommandPriority::Critical));

        match queue.enqueue(command("r1", CommandVerb::Stop, CommandPriority::Critical)) {
            EnqueueOutcome::Enqueued { depth } => assert_eq!(depth, 3),
            other => panic!("critical must never be dropped, got {other:?}"),
        }

        match queue.enqueue(command("r1", CommandVerb::Move, CommandPriority::High)) {
            EnqueueOutcome::Dropped { .. } => {}
            other => panic!("non-critical into all-critical full queue, got {other:?}"),
        }
    }

    #[test]
    fn take_expired_removes_only_aged_entries() {
        let queue = CommandQueue::new(16);
        let stale =
            command("r1", CommandVerb::Move, CommandPriority::Normal).with_timeout(Duration::ZERO);
        let stale_id = stale.id.clone();
        let _ = queue.enqueue(stale);
        let _ = queue.enqueue(command("r1", CommandVerb::Buzzer, CommandPriority::Normal));

        std::thread::sleep(Duration::from_millis(5));
        let robot = RobotId::from("r1");
        let expired = queue.take_expired(&robot);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].command.id, stale_id);
        assert_eq!(queue.depth(&robot), 1);
    }

    #[test]
    fn requeue_front_restores_head_position() {
        let queue = CommandQueue::new(16);
        let first = command("r1", CommandVerb::Move, CommandPriority::Normal);
        let first_id = first.id.clone();
        let _ = queue.enqueue(first);
        let _ = queue.enqueue(command("r1", CommandVerb::Buzzer, CommandPriority::Normal));

        let robot = RobotId::from("r1");
        let mut head = queue.pop_front(&robot).unwrap();
        head.record_attempt();
        queue.requeue_front(head);

        let again = queue.pop_front(&robot).unwrap();
        assert_eq!(again.command.id, first_id);
        assert_eq!(again.attempts, 1);
    }

    #[test]
    fn queues_are_isolated_per_robot() {
        let queue = CommandQueue::new(16);
        let _ = queue.enqueue(command("r1", CommandVerb::Move, CommandPriority::Normal));
        let _ = queue.enqueue(command("r2", CommandVerb::Move, CommandPriority::Normal));
        assert_eq!(queue.depth(&RobotId::from("r1")), 1);
        assert_eq!(queue.depth(&RobotId::from("r2")), 1);
        assert_eq!(queue.total_pending(), 2);
        let mut robots = queue.robots_with_pending();
        robots.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(robots, vec![RobotId::from("r1"), RobotId::from("r2")]);
    }
}
