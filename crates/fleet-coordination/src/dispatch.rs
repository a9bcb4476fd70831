//! Command dispatcher: validate, route, queue, drain, sweep.
//!
//! Routing policy:
//!
//! - A registered target gets an immediate delivery attempt through the
//!   transport gateway; `Delivered` means the transport acknowledged the send
//!   (the end-to-end application ack arrives asynchronously).
//! - An offline target is an expected state, not a fault — the command is
//!   queued and the call reports `Queued`.
//! - Only validation failures reject: empty target, unrecognized verb,
//!   malformed parameters.
//!
//! Draining holds no lock across a delivery await and runs under a per-robot
//! guard, so one flapping connection never stalls the rest of the fleet and a
//! sweep cannot double-drain a robot a reconnect is already draining.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tracing::{debug, info, warn};

use fleet_core::{RobotCommand, RobotId};

use crate::audit::{DispatchAudit, DispatchOutcome};
use crate::connection::RobotConnection;
use crate::gateway::{CommandEnvelope, DeliveryStatus, TransportGateway};
use crate::queue::{CommandQueue, EnqueueOutcome};
use crate::registry::ConnectionRegistry;

/// Caller-visible outcome of a single-target send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The transport acknowledged the send to the live session.
    Delivered,
    /// Stored (or retained) in the robot's queue for later delivery.
    Queued,
    /// Validation failed; the command was never queued.
    Rejected(String),
}

/// Result of draining one robot's queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries delivered this drain.
    pub delivered: usize,
    /// Entries expired (age past command timeout).
    pub expired: usize,
    /// Entries dropped after exhausting the retry budget.
    pub failed: usize,
    /// Entries still queued when the drain ended.
    pub remaining: usize,
    /// The drain stopped early on a delivery failure.
    pub stopped_on_failure: bool,
    /// Another drain for this robot was already running; nothing was done.
    pub skipped: bool,
}

/// Result of a queue sweep across all robots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Robots that had pending entries.
    pub robots: usize,
    /// Total entries delivered.
    pub delivered: usize,
    /// Total entries expired.
    pub expired: usize,
    /// Total entries failed out.
    pub failed: usize,
}

/// Validates and routes commands to robots via the registry.
pub struct CommandDispatcher {
    registry: Arc<ConnectionRegistry>,
    queue: Arc<CommandQueue>,
    gateway: Arc<dyn TransportGateway>,
    audit: Arc<DispatchAudit>,
    delivery_timeout: Duration,
    max_attempts: u32,
    draining: DashSet<RobotId>,
}

impl CommandDispatcher {
    /// Create a dispatcher over the shared registry and queue.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        queue: Arc<CommandQueue>,
        gateway: Arc<dyn TransportGateway>,
        audit: Arc<DispatchAudit>,
        delivery_timeout: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            registry,
            queue,
            gateway,
            audit,
            delivery_timeout,
            max_attempts: max_attempts.max(1),
            draining: DashSet::new(),
        }
    }

    /// Validate and route one command.
    pub async fn send(&self, command: RobotCommand) -> SendOutcome {
        if let Err(reason) = validate(&command) {
            self.audit
                .record(&command, DispatchOutcome::Rejected, Some(reason.clone()));
            warn!(robot_id = %command.robot_id, verb = %command.verb, reason = %reason, "command rejected");
            return SendOutcome::Rejected(reason);
        }

        if let Some(connection) = self.registry.get(&command.robot_id) {
            match self.try_deliver(&connection, &command).await {
                DeliveryStatus::Ack => {
                    self.audit.record(&command, DispatchOutcome::Delivered, None);
                    info!(
                        robot_id = %command.robot_id,
                        command_id = %command.id,
                        verb = %command.verb,
                        "command delivered"
                    );
                    return SendOutcome::Delivered;
                }
                status @ (DeliveryStatus::Timeout | DeliveryStatus::SessionInvalid) => {
                    debug!(
                        robot_id = %command.robot_id,
                        command_id = %command.id,
                        ?status,
                        "immediate delivery unavailable, queueing"
                    );
                }
            }
        }

        self.enqueue_reported(command);
        SendOutcome::Queued
    }

    /// Deliver every queued entry for a robot, in queue order, until empty or
    /// a delivery fails. Invoked on (re)register and from the sweep.
    pub async fn drain(&self, robot_id: &RobotId) -> DrainReport {
        if !self.draining.insert(robot_id.clone()) {
            debug!(robot_id = %robot_id, "drain already in progress");
            return DrainReport {
                skipped: true,
                remaining: self.queue.depth(robot_id),
                ..DrainReport::default()
            };
        }
        let report = self.drain_locked(robot_id).await;
        let _ = self.draining.remove(robot_id);
        report
    }

    async fn drain_locked(&self, robot_id: &RobotId) -> DrainReport {
        let mut report = DrainReport::default();
        report.expired += self.expire_aged(robot_id);

        loop {
            let Some(connection) = self.registry.get(robot_id) else {
                break;
            };
            let Some(mut entry) = self.queue.pop_front(robot_id) else {
                break;
            };
            if entry.is_expired() {
                self.audit.record(
                    &entry.command,
                    DispatchOutcome::Expired,
                    Some("timed out in queue".into()),
                );
                report.expired += 1;
                continue;
            }

            entry.record_attempt();
            match self.try_deliver(&connection, &entry.command).await {
                DeliveryStatus::Ack => {
                    self.audit
                        .record(&entry.command, DispatchOutcome::Delivered, None);
                    report.delivered += 1;
                }
                status @ (DeliveryStatus::Timeout | DeliveryStatus::SessionInvalid) => {
                    report.stopped_on_failure = true;
                    if entry.attempts >= self.max_attempts {
                        self.audit.record(
                            &entry.command,
                            DispatchOutcome::Failed,
                            Some(format!("{status:?} after {} attempts", entry.attempts)),
                        );
                        report.failed += 1;
                    } else {
                        self.queue.requeue_front(entry);
                    }
                    // Leave the rest queued rather than hammering a flapping
                    // connection; the periodic sweep retries.
                    break;
                }
            }
        }

        report.remaining = self.queue.depth(robot_id);
        if report != DrainReport::default() {
            info!(
                robot_id = %robot_id,
                delivered = report.delivered,
                expired = report.expired,
                failed = report.failed,
                remaining = report.remaining,
                "queue drained"
            );
        }
        report
    }

    /// Periodic pass over all queues: expire aged entries everywhere and
    /// retry robots that are registered but still have a backlog.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        for robot_id in self.queue.robots_with_pending() {
            report.robots += 1;
            if self.registry.contains(&robot_id) {
                let drain = self.drain(&robot_id).await;
                report.delivered += drain.delivered;
                report.expired += drain.expired;
                report.failed += drain.failed;
            } else {
                report.expired += self.expire_aged(&robot_id);
            }
        }
        report
    }

    /// Audit trail for dispatch attempts.
    #[must_use]
    pub fn audit(&self) -> &Arc<DispatchAudit> {
        &self.audit
    }

    async fn try_deliver(
        &self,
        connection: &RobotConnection,
        command: &RobotCommand,
    ) -> DeliveryStatus {
        if connection.is_superseded() {
            return DeliveryStatus::SessionInvalid;
        }
        let envelope = CommandEnvelope::from_command(command);
        let delivery = self.gateway.deliver(&connection.session_id, &envelope);
        match tokio::time::timeout(self.delivery_timeout, delivery).await {
            Ok(status) => status,
            Err(_) => DeliveryStatus::Timeout,
        }
    }

    fn enqueue_reported(&self, command: RobotCommand) {
        match self.queue.enqueue(command) {
            EnqueueOutcome::Enqueued { depth } => {
                debug!(depth, "command queued");
            }
            EnqueueOutcome::Evicted { expired, depth } => {
                self.audit.record(
                    &expired,
                    DispatchOutcome::Expired,
                    Some("evicted by queue cap".into()),
                );
                warn!(
                    robot_id = %expired.robot_id,
                    command_id = %expired.id,
                    depth,
                    "queue cap reached, oldest low-priority entry expired"
                );
            }
            EnqueueOutcome::Dropped { expired } => {
                self.audit.record(
                    &expired,
                    DispatchOutcome::Expired,
                    Some("queue full of higher-priority entries".into()),
                );
                warn!(
                    robot_id = %expired.robot_id,
                    command_id = %expired.id,
                    "queue full, incoming command expired"
                );
            }
        }
    }

    fn expire_aged(&self, robot_id: &RobotId) -> usize {
        let expired = self.queue.take_expired(robot_id);
        for entry in &expired {
            self.audit.record(
                &entry.command,
                DispatchOutcome::Expired,
                Some("timed out in queue".into()),
            );
        }
        expired.len()
    }
}

fn validate(command: &RobotCommand) -> Result<(), String> {
    if command.robot_id.is_empty() {
        return Err("missing target robot id".into());
    }
    if !command.verb.is_recognized() {
        return Err(format!("unrecognized verb: {}", command.verb));
    }
    if !(command.parameters.is_object() || command.parameters.is_null()) {
        return Err("parameters must be a JSON object".into());
    }
    Ok(())
}
