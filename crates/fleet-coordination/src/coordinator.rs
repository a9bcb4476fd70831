//! The fleet coordinator: explicitly constructed composition root.
//!
//! Owns the registry, queue, dispatcher, group manager, heartbeat monitor,
//! and emergency stop coordinator, and translates inbound transport events
//! into registry/queue mutations. Constructed once at process startup and
//! passed by reference to whatever needs fleet access — there is no ambient
//! global and no `get_instance`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleet_core::{CommandId, RobotCommand, RobotId, RobotStatus, TransportSessionId, UserId};
use fleet_settings::CoordinationSettings;

use crate::audit::DispatchAudit;
use crate::connection::RobotConnection;
use crate::dispatch::{CommandDispatcher, SendOutcome};
use crate::errors::Result;
use crate::estop::{EmergencyStopCoordinator, EmergencyStopReport};
use crate::gateway::{Authorizer, NotificationKind, Notifier, TransportGateway};
use crate::groups::GroupManager;
use crate::monitor::HeartbeatMonitor;
use crate::queue::CommandQueue;
use crate::registry::{ConnectionRegistry, RegisterOutcome};
use crate::stats::PlatformStats;
use crate::store::{GroupStore, OwnershipStore};

/// Timeout for background task drain during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Top-level fleet coordination component.
pub struct FleetCoordinator {
    settings: CoordinationSettings,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<CommandQueue>,
    dispatcher: Arc<CommandDispatcher>,
    groups: GroupManager,
    estop: EmergencyStopCoordinator,
    monitor: Arc<HeartbeatMonitor>,
    notifier: Arc<dyn Notifier>,
    ownership: Arc<dyn OwnershipStore>,
    group_store: Arc<dyn GroupStore>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FleetCoordinator {
    /// Wire up the coordination core from its collaborators.
    #[must_use]
    pub fn new(
        settings: CoordinationSettings,
        gateway: Arc<dyn TransportGateway>,
        notifier: Arc<dyn Notifier>,
        authorizer: Arc<dyn Authorizer>,
        group_store: Arc<dyn GroupStore>,
        ownership: Arc<dyn OwnershipStore>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let queue = Arc::new(CommandQueue::new(settings.queue_cap));
        let audit = Arc::new(DispatchAudit::new(settings.audit_capacity));
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&queue),
            gateway,
            audit,
            settings.delivery_timeout(),
            settings.max_delivery_attempts,
        ));
        let groups = GroupManager::new(
            Arc::clone(&group_store),
            Arc::clone(&authorizer),
            Arc::clone(&dispatcher),
        );
        let estop = EmergencyStopCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
            Arc::clone(&authorizer),
            Arc::clone(&notifier),
            settings.estop_concurrency,
        );
        let monitor = Arc::new(HeartbeatMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&notifier),
            Arc::clone(&ownership),
            settings.staleness_threshold(),
            settings.sweep_interval(),
        ));

        Self {
            settings,
            registry,
            queue,
            dispatcher,
            groups,
            estop,
            monitor,
            notifier,
            ownership,
            group_store,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound transport events
    // ─────────────────────────────────────────────────────────────────────

    /// A robot completed an authenticated connect.
    ///
    /// Registers (replacing any prior session), notifies the owner, and
    /// drains the robot's queued commands.
    pub async fn handle_connect(
        &self,
        robot_id: RobotId,
        session_id: TransportSessionId,
        address: String,
        capabilities: serde_json::Value,
        configuration: serde_json::Value,
    ) -> RegisterOutcome {
        let connection = RobotConnection::new(
            robot_id.clone(),
            session_id,
            address,
            capabilities,
            configuration,
        );
        let outcome = self.registry.register(connection);

        if outcome == RegisterOutcome::Connected {
            self.notify_owner(
                &robot_id,
                "Robot Connected",
                &format!("Robot {robot_id} has connected successfully"),
                NotificationKind::Success,
            )
            .await;
        }

        let drain = self.dispatcher.drain(&robot_id).await;
        if drain.remaining > 0 {
            debug!(
                robot_id = %robot_id,
                remaining = drain.remaining,
                "backlog left after connect drain"
            );
        }
        outcome
    }

    /// A heartbeat (optionally carrying a status update) arrived.
    pub fn handle_heartbeat(&self, robot_id: &RobotId, status: Option<RobotStatus>) -> bool {
        self.registry.touch(robot_id, status)
    }

    /// The transport reports an explicit disconnect.
    pub async fn handle_disconnect(&self, robot_id: &RobotId) {
        if self.registry.unregister(robot_id).is_some() {
            self.notify_owner(
                robot_id,
                "Robot Disconnected",
                &format!("Robot {robot_id} has disconnected from the platform"),
                NotificationKind::Warning,
            )
            .await;
        }
    }

    /// A transport session closed. Unregisters (and notifies) only when the
    /// robot is still bound to that session — an old socket dying after a
    /// reconnect leaves the newer session alone.
    pub async fn handle_session_closed(
        &self,
        robot_id: &RobotId,
        session_id: &TransportSessionId,
    ) {
        if self
            .registry
            .unregister_session(robot_id, session_id)
            .is_some()
        {
            self.notify_owner(
                robot_id,
                "Robot Disconnected",
                &format!("Robot {robot_id} has disconnected from the platform"),
                NotificationKind::Warning,
            )
            .await;
        }
    }

    /// The robot confirmed execution of a command (application-level ack).
    pub fn handle_command_ack(&self, robot_id: &RobotId, command_id: &CommandId) {
        if !self.dispatcher.audit().record_ack(robot_id, command_id) {
            debug!(robot_id = %robot_id, command_id = %command_id, "ack for unknown command");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Control-plane operations
    // ─────────────────────────────────────────────────────────────────────

    /// Validate and route one command.
    pub async fn send_command(&self, command: RobotCommand) -> SendOutcome {
        self.dispatcher.send(command).await
    }

    /// Group CRUD and fan-out.
    #[must_use]
    pub fn groups(&self) -> &GroupManager {
        &self.groups
    }

    /// Broadcast a critical stop to every robot visible to the caller.
    pub async fn emergency_stop_all(&self, user_id: &UserId) -> Result<EmergencyStopReport> {
        self.estop.emergency_stop_all(user_id).await
    }

    /// Read-only platform statistics snapshot.
    pub fn statistics(&self) -> Result<PlatformStats> {
        let connections = self.registry.list_all();
        let groups = self.group_store.count_groups()?;
        Ok(PlatformStats::from_parts(
            &connections,
            self.queue.total_pending(),
            groups,
        ))
    }

    /// The live connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The per-robot command queues.
    #[must_use]
    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    /// The dispatch audit trail.
    #[must_use]
    pub fn audit(&self) -> &Arc<DispatchAudit> {
        self.dispatcher.audit()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Background tasks
    // ─────────────────────────────────────────────────────────────────────

    /// Spawn the heartbeat monitor and the queue retry sweep.
    pub fn start_background_tasks(&self) {
        let mut tasks = self.tasks.lock();

        let monitor = Arc::clone(&self.monitor);
        let monitor_cancel = self.cancel.child_token();
        tasks.push(tokio::spawn(async move {
            monitor.run(monitor_cancel).await;
        }));

        let dispatcher = Arc::clone(&self.dispatcher);
        let sweep_cancel = self.cancel.child_token();
        let sweep_interval = self.settings.queue_sweep_interval();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            let _ = interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = dispatcher.sweep().await;
                        if report.delivered + report.expired + report.failed > 0 {
                            info!(
                                robots = report.robots,
                                delivered = report.delivered,
                                expired = report.expired,
                                failed = report.failed,
                                "queue sweep completed"
                            );
                        }
                    }
                    () = sweep_cancel.cancelled() => {
                        debug!("queue sweep stopped");
                        return;
                    }
                }
            }
        }));
        info!("fleet coordinator background tasks started");
    }

    /// Stop background tasks and wait for them to drain.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        info!(task_count = handles.len(), "waiting for coordinator tasks");
        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
            warn!("coordinator shutdown timed out, some tasks may still be running");
        }
    }

    async fn notify_owner(
        &self,
        robot_id: &RobotId,
        title: &str,
        message: &str,
        kind: NotificationKind,
    ) {
        match self.ownership.owner_of(robot_id) {
            Ok(Some(owner)) => {
                self.notifier
                    .notify_user(&owner, title, message, kind)
                    .await;
            }
            Ok(None) => {
                debug!(robot_id = %robot_id, "no owner on record, skipping notification");
            }
            Err(error) => {
                warn!(robot_id = %robot_id, %error, "ownership lookup failed");
            }
        }
    }
}
