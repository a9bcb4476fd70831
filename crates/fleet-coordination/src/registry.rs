//! In-memory registry of currently-connected robots.
//!
//! State is sharded by robot ID via `DashMap`, so operations on unrelated
//! robots never contend on a single lock while each robot's record mutates
//! linearizably under its shard guard. The registry is a leaf: it triggers
//! nothing itself — queue draining and notifications on (re)connect are the
//! coordinator's job.

use dashmap::DashMap;

use fleet_core::{RobotId, RobotStatus, TransportSessionId};
use tracing::{debug, info};

use crate::connection::RobotConnection;

/// Outcome of a `register` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First connection for this robot ID.
    Connected,
    /// A live entry existed and was replaced; the prior session is superseded.
    Reconnected {
        /// The transport session that was invalidated.
        superseded_session: TransportSessionId,
    },
}

/// Registry of live robot connections, at most one entry per robot ID.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<RobotId, RobotConnection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Insert or replace the connection for a robot.
    ///
    /// On replace, the prior entry's session is marked superseded so that
    /// in-flight deliveries bound to it fail fast.
    pub fn register(&self, connection: RobotConnection) -> RegisterOutcome {
        let robot_id = connection.robot_id.clone();
        let session_id = connection.session_id.clone();
        let previous = self.connections.insert(robot_id.clone(), connection);

        match previous {
            Some(old) => {
                old.mark_superseded();
                info!(
                    robot_id = %robot_id,
                    session_id = %session_id,
                    superseded = %old.session_id,
                    "robot reconnected"
                );
                RegisterOutcome::Reconnected {
                    superseded_session: old.session_id,
                }
            }
            None => {
                info!(robot_id = %robot_id, session_id = %session_id, "robot connected");
                RegisterOutcome::Connected
            }
        }
    }

    /// Remove a robot's connection. Idempotent: removing an absent robot is a
    /// no-op returning `None`.
    pub fn unregister(&self, robot_id: &RobotId) -> Option<RobotConnection> {
        match self.connections.remove(robot_id) {
            Some((_, connection)) => {
                connection.mark_superseded();
                info!(robot_id = %robot_id, session_id = %connection.session_id, "robot unregistered");
                Some(connection)
            }
            None => {
                debug!(robot_id = %robot_id, "unregister for robot not in registry");
                None
            }
        }
    }

    /// Remove a robot's connection only if it is still bound to `session_id`.
    ///
    /// Used by transport close paths: an old socket dying after a reconnect
    /// must not evict the newer session.
    pub fn unregister_session(
        &self,
        robot_id: &RobotId,
        session_id: &TransportSessionId,
    ) -> Option<RobotConnection> {
        let removed = self
            .connections
            .remove_if(robot_id, |_, connection| {
                connection.session_id == *session_id
            })
            .map(|(_, connection)| connection);
        if let Some(connection) = &removed {
            connection.mark_superseded();
            info!(robot_id = %robot_id, session_id = %session_id, "robot session closed");
        } else {
            debug!(robot_id = %robot_id, session_id = %session_id, "stale session close ignored");
        }
        removed
    }

    /// Update last-seen (and optionally status) for a robot.
    ///
    /// Heartbeats can race with disconnects, so an unknown robot is logged
    /// and ignored rather than treated as an error. Returns whether the robot
    /// was present.
    pub fn touch(&self, robot_id: &RobotId, status: Option<RobotStatus>) -> bool {
        match self.connections.get_mut(robot_id) {
            Some(mut entry) => {
                entry.touch(status);
                true
            }
            None => {
                debug!(robot_id = %robot_id, "heartbeat for robot not in registry");
                false
            }
        }
    }

    /// Snapshot of one robot's connection.
    #[must_use]
    pub fn get(&self, robot_id: &RobotId) -> Option<RobotConnection> {
        self.connections.get(robot_id).map(|entry| entry.clone())
    }

    /// Whether a robot is currently registered.
    #[must_use]
    pub fn contains(&self, robot_id: &RobotId) -> bool {
        self.connections.contains_key(robot_id)
    }

    /// Cloned snapshot of every live connection.
    ///
    /// Robots connecting or disconnecting during the iteration are picked up
    /// by the caller's next pass; the returned records never mutate.
    #[must_use]
    pub fn list_all(&self) -> Vec<RobotConnection> {
        self.connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
