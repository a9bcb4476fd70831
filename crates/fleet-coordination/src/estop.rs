//! Emergency stop: best-effort critical broadcast to the connected fleet.
//!
//! The stop fans out over a registry snapshot with bounded concurrency and
//! never waits on one robot before issuing to the next. Per-robot failures
//! are collected into the report; the call itself fails only on a
//! precondition violation (invalid caller).

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use fleet_core::{CommandPriority, CommandVerb, RobotCommand, RobotId, UserId};

use crate::dispatch::{CommandDispatcher, SendOutcome};
use crate::errors::{CoordinationError, Result};
use crate::gateway::{ActionScope, Authorizer, NotificationKind, Notifier};
use crate::registry::ConnectionRegistry;

/// One robot's outcome in an emergency stop.
#[derive(Clone, Debug, Serialize)]
pub struct StopOutcome {
    /// The robot the stop was issued to.
    pub robot_id: RobotId,
    /// `true` when the transport acknowledged the stop.
    pub delivered: bool,
    /// Failure or queue detail when not delivered.
    pub detail: Option<String>,
}

/// Summary of an emergency stop fan-out.
#[derive(Clone, Debug, Default, Serialize)]
pub struct EmergencyStopReport {
    /// Robots targeted (registry size at call time for an elevated caller).
    pub total: usize,
    /// Stops acknowledged by the transport.
    pub stopped: usize,
    /// Stops queued for robots that slipped offline mid-call.
    pub queued: usize,
    /// Stops that could not be issued.
    pub failed: usize,
    /// Per-robot outcomes.
    pub outcomes: Vec<StopOutcome>,
}

/// Broadcasts a `critical` stop to every visible connected robot.
pub struct EmergencyStopCoordinator {
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    authorizer: Arc<dyn Authorizer>,
    notifier: Arc<dyn Notifier>,
    concurrency: usize,
}

impl EmergencyStopCoordinator {
    /// Create an emergency stop coordinator.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<CommandDispatcher>,
        authorizer: Arc<dyn Authorizer>,
        notifier: Arc<dyn Notifier>,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            authorizer,
            notifier,
            concurrency: concurrency.max(1),
        }
    }

    /// Issue a `critical` stop to every connected robot visible to the caller.
    pub async fn emergency_stop_all(&self, user_id: &UserId) -> Result<EmergencyStopReport> {
        if !self.authorizer.is_valid_user(user_id).await {
            return Err(CoordinationError::Unauthorized {
                user_id: user_id.clone(),
                scope: "emergency stop".into(),
            });
        }

        // Snapshot once; robots connecting afterwards are not part of this
        // stop, robots disconnecting mid-call get their stop queued.
        let snapshot = self.registry.list_all();
        let elevated = self
            .authorizer
            .can_act(user_id, &ActionScope::Fleet)
            .await;
        let mut targets = Vec::with_capacity(snapshot.len());
        for connection in snapshot {
            let robot_id = connection.robot_id;
            if elevated {
                targets.push(robot_id);
                continue;
            }
            let scope = ActionScope::Robot(robot_id.clone());
            if self.authorizer.can_act(user_id, &scope).await {
                targets.push(robot_id);
            }
        }

        warn!(user_id = %user_id, robots = targets.len(), "emergency stop initiated");

        let outcomes: Vec<StopOutcome> = futures::stream::iter(targets.into_iter().map(
            |robot_id| {
                let command = RobotCommand::new(
                    robot_id.clone(),
                    CommandVerb::Stop,
                    json!({ "emergency": true }),
                    user_id.clone(),
                )
                .with_priority(CommandPriority::Critical);
                async move {
                    match self.dispatcher.send(command).await {
                        SendOutcome::Delivered => StopOutcome {
                            robot_id,
                            delivered: true,
                            detail: None,
                        },
                        SendOutcome::Queued => StopOutcome {
                            robot_id,
                            delivered: false,
                            detail: Some("queued".into()),
                        },
                        SendOutcome::Rejected(reason) => StopOutcome {
                            robot_id,
                            delivered: false,
                            detail: Some(reason),
                        },
                    }
                }
            },
        ))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let mut report = EmergencyStopReport {
            total: outcomes.len(),
            ..EmergencyStopReport::default()
        };
        for outcome in &outcomes {
            if outcome.delivered {
                report.stopped += 1;
            } else if outcome.detail.as_deref() == Some("queued") {
                report.queued += 1;
            } else {
                report.failed += 1;
            }
        }
        report.outcomes = outcomes;

        info!(
            user_id = %user_id,
            total = report.total,
            stopped = report.stopped,
            queued = report.queued,
            failed = report.failed,
            "emergency stop completed"
        );
        self.notifier
            .notify_user(
                user_id,
                "Emergency Stop Activated",
                &format!("Emergency stop sent to {} robots", report.total),
                NotificationKind::Warning,
            )
            .await;

        Ok(report)
    }
}
