//! Live robot connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fleet_core::{RobotId, RobotStatus, TransportSessionId};

/// One currently-connected robot.
///
/// Cloned snapshots share the `superseded` flag with the registry's live
/// entry, so an in-flight dispatch holding a stale clone still observes the
/// flip when a reconnect replaces the session.
#[derive(Clone, Debug)]
pub struct RobotConnection {
    /// Stable robot identity.
    pub robot_id: RobotId,
    /// Ephemeral transport session; changes on every reconnect.
    pub session_id: TransportSessionId,
    /// Source address as reported by the transport.
    pub address: String,
    /// Last reported status.
    pub status: RobotStatus,
    /// Free-form capability descriptor reported at connect.
    pub capabilities: serde_json::Value,
    /// Free-form configuration descriptor reported at connect.
    pub configuration: serde_json::Value,
    /// When the connection was established (monotonic).
    pub connected_at: Instant,
    last_seen: Instant,
    superseded: Arc<AtomicBool>,
}

impl RobotConnection {
    /// Create a fresh connection record with `last_seen = now`.
    #[must_use]
    pub fn new(
        robot_id: RobotId,
        session_id: TransportSessionId,
        address: String,
        capabilities: serde_json::Value,
        configuration: serde_json::Value,
    ) -> Self {
        let now = Instant::now();
        Self {
            robot_id,
            session_id,
            address,
            status: RobotStatus::Online,
            capabilities,
            configuration,
            connected_at: now,
            last_seen: now,
            superseded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Refresh the last-seen timestamp and optionally the reported status.
    pub fn touch(&mut self, status: Option<RobotStatus>) {
        self.last_seen = Instant::now();
        if let Some(status) = status {
            self.status = status;
        }
    }

    /// Time since the last heartbeat or status event.
    #[must_use]
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.elapsed()
    }

    /// Mark this session as replaced by a newer connection.
    ///
    /// In-flight deliveries bound to this session must fail fast instead of
    /// succeeding against a stale socket.
    pub fn mark_superseded(&self) {
        self.superseded.store(true, Ordering::Release);
    }

    /// Whether a newer session has replaced this one.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Acquire)
    }
}
