//! Heartbeat staleness monitoring.
//!
//! A fixed-interval sweep demotes robots whose last-seen time exceeds the
//! staleness threshold and evicts them from the registry, so detection
//! latency is bounded by `threshold + sweep_interval` rather than by traffic.
//!
//! Within one sweep a robot passes through a one-shot `stale` grace state:
//! candidates are collected first, then re-checked before removal, so a
//! heartbeat racing the sweep resets the robot to online and it survives.
//! Removal is represented by absence — no lingering offline record — and the
//! robot's command queue is left intact so a future reconnect still drains it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleet_core::RobotId;

use crate::gateway::{NotificationKind, Notifier};
use crate::registry::ConnectionRegistry;
use crate::store::OwnershipStore;

/// Result of one monitor sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonitorSweep {
    /// Live connections examined.
    pub checked: usize,
    /// Robots that entered the grace state this sweep.
    pub stale: usize,
    /// Robots removed from the registry.
    pub removed: Vec<RobotId>,
}

/// Periodic liveness sweep over the connection registry.
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    notifier: Arc<dyn Notifier>,
    ownership: Arc<dyn OwnershipStore>,
    staleness_threshold: Duration,
    sweep_interval: Duration,
}

impl HeartbeatMonitor {
    /// Create a monitor over the shared registry.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        notifier: Arc<dyn Notifier>,
        ownership: Arc<dyn OwnershipStore>,
        staleness_threshold: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            registry,
            notifier,
            ownership,
            staleness_threshold,
            sweep_interval,
        }
    }

    /// Run sweeps until cancelled. The cadence is fixed — independent of
    /// connection events.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = time::interval(self.sweep_interval);
        // Skip the immediate first tick.
        let _ = interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let sweep = self.sweep_once().await;
                    if !sweep.removed.is_empty() {
                        info!(
                            checked = sweep.checked,
                            removed = sweep.removed.len(),
                            "staleness sweep evicted robots"
                        );
                    }
                }
                () = cancel.cancelled() => {
                    debug!("heartbeat monitor stopped");
                    return;
                }
            }
        }
    }

    /// One staleness pass over a registry snapshot.
    ///
    /// Robots connecting or disconnecting mid-sweep are handled on the next
    /// cycle; they never fail the current one.
    pub async fn sweep_once(&self) -> MonitorSweep {
        let snapshot = self.registry.list_all();
        let mut sweep = MonitorSweep {
            checked: snapshot.len(),
            ..MonitorSweep::default()
        };

        // Pass 1: collect stale candidates.
        let mut candidates = Vec::new();
        for connection in snapshot {
            if connection.last_seen_elapsed() > self.staleness_threshold {
                debug!(
                    robot_id = %connection.robot_id,
                    elapsed_ms = connection.last_seen_elapsed().as_millis() as u64,
                    "robot heartbeat stale"
                );
                candidates.push(connection.robot_id);
            }
        }
        sweep.stale = candidates.len();

        // Grace: let racing heartbeats land before the removal re-check.
        tokio::task::yield_now().await;

        // Pass 2: re-check and remove. A heartbeat (or reconnect) in the
        // meantime refreshed last_seen and the robot stays.
        for robot_id in candidates {
            let still_stale = self
                .registry
                .get(&robot_id)
                .is_some_and(|c| c.last_seen_elapsed() > self.staleness_threshold);
            if !still_stale {
                continue;
            }
            if self.registry.unregister(&robot_id).is_some() {
                warn!(robot_id = %robot_id, "robot removed after heartbeat timeout");
                self.notify_offline(&robot_id).await;
                sweep.removed.push(robot_id);
            }
        }
        sweep
    }

    /// Notify the robot's owner exactly once per removal.
    async fn notify_offline(&self, robot_id: &RobotId) {
        let owner = match self.ownership.owner_of(robot_id) {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                debug!(robot_id = %robot_id, "no owner on record, skipping offline notification");
                return;
            }
            Err(error) => {
                warn!(robot_id = %robot_id, %error, "ownership lookup failed");
                return;
            }
        };
        self.notifier
            .notify_user(
                &owner,
                "Robot Offline",
                &format!("Robot {robot_id} stopped sending heartbeats and was marked offline"),
                NotificationKind::Warning,
            )
            .await;
    }
}
