//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Robots currently registered as connected.
    pub connected_robots: usize,
    /// Live transport sessions (includes not-yet-identified sockets).
    pub sessions: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connected_robots: usize, sessions: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connected_robots,
        sessions,
    }
}
