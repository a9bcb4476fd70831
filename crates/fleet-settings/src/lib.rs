//! # fleet-settings
//!
//! Layered configuration for the fleet platform.
//!
//! Loading flow:
//! 1. Start with compiled [`FleetSettings::default()`]
//! 2. If `~/.fleet/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `FLEET_*` environment variable overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{
    CoordinationSettings, FleetSettings, LoggingSettings, ServerSettings, StoreSettings,
};
