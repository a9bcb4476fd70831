//! `FleetServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use fleet_coordination::FleetCoordinator;
use fleet_settings::ServerSettings;

use crate::health::{self, HealthResponse};
use crate::transport::WsTransport;
use crate::ws::run_robot_session;

/// Errors raised while serving.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listen address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that failed.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The accept loop failed.
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The coordination core.
    pub coordinator: Arc<FleetCoordinator>,
    /// The WebSocket transport gateway.
    pub transport: Arc<WsTransport>,
    /// When the server started.
    pub start_time: Instant,
}

/// The fleet HTTP/WebSocket server.
pub struct FleetServer {
    settings: ServerSettings,
    coordinator: Arc<FleetCoordinator>,
    transport: Arc<WsTransport>,
    start_time: Instant,
    cancel: CancellationToken,
}

impl FleetServer {
    /// Create a server over an already-wired coordinator and transport.
    ///
    /// The transport must be the same instance the coordinator dispatches
    /// through, or deliveries will go nowhere.
    #[must_use]
    pub fn new(
        settings: ServerSettings,
        coordinator: Arc<FleetCoordinator>,
        transport: Arc<WsTransport>,
    ) -> Self {
        Self {
            settings,
            coordinator,
            transport,
            start_time: Instant::now(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            coordinator: Arc::clone(&self.coordinator),
            transport: Arc::clone(&self.transport),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/stats", get(stats_handler))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Token that stops the accept loop when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Bind and serve until the shutdown token fires.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;
        info!(%local, "fleet server listening");

        let cancel = self.cancel.clone();
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
        Ok(())
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.coordinator.registry().len(),
        state.transport.session_count(),
    );
    Json(resp)
}

/// GET /stats
async fn stats_handler(State(state): State<AppState>) -> Response {
    match state.coordinator.statistics() {
        Ok(stats) => Json(stats).into_response(),
        Err(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response(),
    }
}

/// GET /ws — robot transport upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| run_robot_session(socket, peer, state))
}
