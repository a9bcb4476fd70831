//! Robot WebSocket session lifecycle — from upgrade through disconnect.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use fleet_core::RobotId;

use crate::protocol::{RobotFrame, ServerFrame};
use crate::server::AppState;

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Outbound channel depth per robot socket.
const OUTBOUND_BUFFER: usize = 256;

/// Run a robot WebSocket session.
///
/// 1. Mints a transport session and sends a `connected` frame
/// 2. Waits for the robot's `hello`, then registers it with the coordinator
/// 3. Routes heartbeats, status updates, and acks into the coordinator
/// 4. Forwards queued command frames out to the socket, pinging periodically
/// 5. On close, tears down the session (only if still the robot's current one)
#[instrument(skip_all, fields(peer = %peer))]
pub async fn run_robot_session(ws: WebSocket, peer: SocketAddr, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(OUTBOUND_BUFFER);
    // The session exists before `hello`; the robot is bound once it
    // identifies itself.
    let session = state.transport.register_session(send_tx);
    let session_id = session.session_id.clone();

    let connected = ServerFrame::Connected {
        session_id: session_id.as_str(),
    };
    if let Ok(json) = serde_json::to_string(&connected) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with periodic pings.
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        // Skip the immediate first tick.
        let _ = ping_interval.tick().await;
        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut robot_id: Option<RobotId> = None;

    while let Some(Ok(message)) = ws_rx.next().await {
        let text = match message {
            Message::Text(text) => text.to_string(),
            Message::Close(_) => {
                debug!("robot sent close frame");
                break;
            }
            // Pings are answered by axum; pongs carry no state here because
            // liveness is heartbeat-frame driven.
            _ => continue,
        };

        let frame: RobotFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "unparseable robot frame");
                send_error(&session, "unparseable frame");
                continue;
            }
        };

        match frame {
            RobotFrame::Hello {
                robot_id: id,
                capabilities,
                configuration,
            } => {
                if robot_id.is_some() {
                    send_error(&session, "duplicate hello");
                    continue;
                }
                if id.is_empty() {
                    send_error(&session, "robotId is required");
                    continue;
                }
                info!(robot_id = %id, session_id = %session_id, "robot identified");
                session.bind_robot(id.clone());
                let _ = state
                    .coordinator
                    .handle_connect(
                        id.clone(),
                        session_id.clone(),
                        peer.to_string(),
                        capabilities,
                        configuration,
                    )
                    .await;
                robot_id = Some(id);
            }
            RobotFrame::Heartbeat { status } => {
                let Some(id) = &robot_id else {
                    send_error(&session, "hello required first");
                    continue;
                };
                let _ = state.coordinator.handle_heartbeat(id, status);
            }
            RobotFrame::Status { status } => {
                let Some(id) = &robot_id else {
                    send_error(&session, "hello required first");
                    continue;
                };
                let _ = state.coordinator.handle_heartbeat(id, Some(status));
            }
            RobotFrame::Ack { command_id } => {
                let Some(id) = &robot_id else {
                    send_error(&session, "hello required first");
                    continue;
                };
                state.coordinator.handle_command_ack(id, &command_id);
            }
        }
    }

    // Teardown: stop deliveries to this session, then unbind the robot if it
    // is still attached to this session (a reconnect may already own it).
    state.transport.remove_session(&session_id);
    outbound.abort();
    if let Some(id) = robot_id {
        state
            .coordinator
            .handle_session_closed(&id, &session_id)
            .await;
        info!(robot_id = %id, session_id = %session_id, "robot session ended");
    } else {
        debug!(session_id = %session_id, "unidentified session ended");
    }
}

fn send_error(session: &crate::transport::RobotSession, message: &str) {
    let frame = ServerFrame::Error { message };
    if let Ok(json) = serde_json::to_string(&frame) {
        let _ = session.send(Arc::new(json));
    }
}
