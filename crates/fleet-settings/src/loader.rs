//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::FleetSettings;

/// Resolve the path to the settings file (`~/.fleet/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".fleet").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FleetSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<FleetSettings> {
    let defaults = serde_json::to_value(FleetSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: FleetSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules; invalid values are silently
/// ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut FleetSettings) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("FLEET_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("FLEET_PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Coordination ────────────────────────────────────────────────
    if let Some(v) = read_env_u64("FLEET_STALENESS_THRESHOLD_MS", 1000, 3_600_000) {
        settings.coordination.staleness_threshold_ms = v;
    }
    if let Some(v) = read_env_u64("FLEET_SWEEP_INTERVAL_MS", 100, 600_000) {
        settings.coordination.sweep_interval_ms = v;
    }
    if let Some(v) = read_env_u64("FLEET_QUEUE_SWEEP_INTERVAL_MS", 100, 600_000) {
        settings.coordination.queue_sweep_interval_ms = v;
    }
    if let Some(v) = read_env_usize("FLEET_QUEUE_CAP", 1, 100_000) {
        settings.coordination.queue_cap = v;
    }
    if let Some(v) = read_env_u32("FLEET_MAX_DELIVERY_ATTEMPTS", 1, 100) {
        settings.coordination.max_delivery_attempts = v;
    }
    if let Some(v) = read_env_u64("FLEET_DELIVERY_TIMEOUT_MS", 100, 600_000) {
        settings.coordination.delivery_timeout_ms = v;
    }
    if let Some(v) = read_env_usize("FLEET_ESTOP_CONCURRENCY", 1, 1024) {
        settings.coordination.estop_concurrency = v;
    }

    // ── Store ───────────────────────────────────────────────────────
    if let Some(v) = read_env_string("FLEET_DB_PATH") {
        settings.store.db_path = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("FLEET_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("FLEET_LOG_JSON") {
        settings.logging.json = v;
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    std::env::var(name)
        .ok()?
        .parse::<u16>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    std::env::var(name)
        .ok()?
        .parse::<u32>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    std::env::var(name)
        .ok()?
        .parse::<usize>()
        .ok()
        .filter(|v| (min..=max).contains(v))
}

fn read_env_bool(name: &str) -> Option<bool> {
    parse_bool(&std::env::var(name).ok()?)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn merge_objects_recursively() {
        let target = json!({"a": {"x": 1, "y": 2}, "b": 3});
        let source = json!({"a": {"y": 20}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"a": {"x": 1, "y": 20}, "b": 3}));
    }

    #[test]
    fn null_in_source_preserves_target() {
        let target = json!({"a": 1});
        let source = json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn arrays_replaced_entirely() {
        let target = json!({"a": [1, 2, 3]});
        let source = json!({"a": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"a": [4]}));
    }

    #[test]
    fn missing_file_returns_defaults() {
        let settings =
            load_settings_from_path(Path::new("/nonexistent/fleet/settings.json")).unwrap();
        assert_eq!(settings.coordination.staleness_threshold_ms, 90_000);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let result = load_settings_from_path(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"coordination": {{"queueCap": 8}}, "server": {{"port": 7000}}}}"#
        )
        .unwrap();
        let settings = load_settings_from_path(file.path()).unwrap();
        assert_eq!(settings.coordination.queue_cap, 8);
        assert_eq!(settings.server.port, 7000);
        // Untouched keys keep their defaults
        assert_eq!(settings.coordination.sweep_interval_ms, 30_000);
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        for (raw, expected) in [("true", true), ("1", true), ("off", false), ("NO", false)] {
            assert_eq!(parse_bool(raw), Some(expected), "{raw}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }
}
