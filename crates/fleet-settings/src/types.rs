//! Settings type definitions with compiled defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level settings for the fleet platform.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FleetSettings {
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Fleet coordination tunables.
    pub coordination: CoordinationSettings,
    /// Persistence settings.
    pub store: StoreSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Server bind settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9400,
            max_message_size: 1024 * 1024,
        }
    }
}

/// Tunables for the coordination core.
///
/// The millisecond fields mirror the wire/settings-file representation; use
/// the `Duration` accessors from code.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinationSettings {
    /// Gap since last heartbeat before a robot is considered offline.
    pub staleness_threshold_ms: u64,
    /// Interval between heartbeat monitor sweeps.
    pub sweep_interval_ms: u64,
    /// Interval between command queue retry sweeps.
    pub queue_sweep_interval_ms: u64,
    /// Maximum queued commands per robot before lowest-priority eviction.
    pub queue_cap: usize,
    /// Delivery attempts before a queued command is reported failed.
    pub max_delivery_attempts: u32,
    /// Timeout for a single transport delivery attempt.
    pub delivery_timeout_ms: u64,
    /// Concurrent deliveries during emergency stop fan-out.
    pub estop_concurrency: usize,
    /// Entries retained in the in-memory dispatch audit trail.
    pub audit_capacity: usize,
}

impl Default for CoordinationSettings {
    fn default() -> Self {
        Self {
            staleness_threshold_ms: 90_000,
            sweep_interval_ms: 30_000,
            queue_sweep_interval_ms: 15_000,
            queue_cap: 64,
            max_delivery_attempts: 5,
            delivery_timeout_ms: 10_000,
            estop_concurrency: 16,
            audit_capacity: 1024,
        }
    }
}

impl CoordinationSettings {
    /// Staleness threshold as a `Duration`.
    #[must_use]
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }

    /// Heartbeat sweep interval as a `Duration`.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Queue retry sweep interval as a `Duration`.
    #[must_use]
    pub fn queue_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.queue_sweep_interval_ms)
    }

    /// Per-attempt delivery timeout as a `Duration`.
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Path to the SQLite database file.
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            db_path: format!("{home}/.fleet/fleet.db"),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default log filter (overridden by `RUST_LOG`).
    pub level: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_design_constants() {
        let s = CoordinationSettings::default();
        assert_eq!(s.staleness_threshold(), Duration::from_secs(90));
        assert_eq!(s.sweep_interval(), Duration::from_secs(30));
        assert_eq!(s.queue_cap, 64);
        assert_eq!(s.max_delivery_attempts, 5);
        assert_eq!(s.delivery_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn default_server_bind() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 9400);
    }

    #[test]
    fn serde_round_trip() {
        let s = FleetSettings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: FleetSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.port, s.server.port);
        assert_eq!(
            back.coordination.staleness_threshold_ms,
            s.coordination.staleness_threshold_ms
        );
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let back: FleetSettings = serde_json::from_str(r#"{"server":{"port":1}}"#).unwrap();
        assert_eq!(back.server.port, 1);
        assert_eq!(back.server.host, "127.0.0.1");
        assert_eq!(back.coordination.queue_cap, 64);
    }
}
