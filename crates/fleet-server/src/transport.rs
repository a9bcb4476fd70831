//! WebSocket-backed implementation of the transport gateway.
//!
//! Each connected robot gets a session entry holding the sender side of its
//! outbound channel; the session's write task owns the socket. Delivery is
//! transport-level: a command is `Ack`ed once it is accepted into the live
//! session's channel, `Timeout` when the channel is saturated, and
//! `SessionInvalid` when no such session exists (closed or superseded).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use fleet_core::{RobotId, TransportSessionId};
use fleet_coordination::{CommandEnvelope, DeliveryStatus, TransportGateway};

use crate::protocol::ServerFrame;

/// One live robot socket's send side.
pub struct RobotSession {
    /// Session identity, minted at upgrade time.
    pub session_id: TransportSessionId,
    /// The robot bound to this session (set once its `hello` arrives).
    robot_id: Mutex<Option<RobotId>>,
    tx: mpsc::Sender<Arc<String>>,
    /// When the session was established.
    pub connected_at: Instant,
    dropped: AtomicU64,
}

impl RobotSession {
    /// Bind this session to the robot that identified itself.
    pub fn bind_robot(&self, robot_id: RobotId) {
        *self.robot_id.lock() = Some(robot_id);
    }

    /// The bound robot, if the session has seen a `hello`.
    #[must_use]
    pub fn robot_id(&self) -> Option<RobotId> {
        self.robot_id.lock().clone()
    }

    /// Queue a text frame for the session's write task.
    ///
    /// Returns `false` (and counts the drop) when the channel is full or the
    /// write task is gone.
    pub fn send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Frames dropped because the channel was saturated.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Registry of live robot sessions, keyed by session ID.
#[derive(Default)]
pub struct WsTransport {
    sessions: DashMap<TransportSessionId, Arc<RobotSession>>,
}

impl WsTransport {
    /// Create an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a new session for a robot socket.
    pub fn register_session(&self, tx: mpsc::Sender<Arc<String>>) -> Arc<RobotSession> {
        let session = Arc::new(RobotSession {
            session_id: TransportSessionId::new(),
            robot_id: Mutex::new(None),
            tx,
            connected_at: Instant::now(),
            dropped: AtomicU64::new(0),
        });
        let _ = self
            .sessions
            .insert(session.session_id.clone(), Arc::clone(&session));
        session
    }

    /// Drop a session; deliveries to it return `SessionInvalid` afterwards.
    pub fn remove_session(&self, session_id: &TransportSessionId) {
        if self.sessions.remove(session_id).is_some() {
            debug!(session_id = %session_id, "transport session removed");
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl TransportGateway for WsTransport {
    async fn deliver(
        &self,
        session_id: &TransportSessionId,
        envelope: &CommandEnvelope,
    ) -> DeliveryStatus {
        let Some(session) = self.sessions.get(session_id).map(|s| Arc::clone(&s)) else {
            return DeliveryStatus::SessionInvalid;
        };

        let frame = ServerFrame::Command { envelope };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(error) => {
                warn!(command_id = %envelope.command_id, %error, "failed to serialize command frame");
                return DeliveryStatus::Timeout;
            }
        };

        if session.send(Arc::new(json)) {
            DeliveryStatus::Ack
        } else {
            warn!(
                session_id = %session_id,
                dropped = session.drop_count(),
                "session channel saturated"
            );
            DeliveryStatus::Timeout
        }
    }
}
