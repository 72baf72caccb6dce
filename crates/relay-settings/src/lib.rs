//! # relay-settings
//!
//! Configuration management with layered sources for the relay server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.relay/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RELAY_*` overrides (highest priority)
//!
//! The binary applies its CLI flags on top and then calls
//! [`RelaySettings::validate`].
//!
//! # Usage
//!
//! ```no_run
//! use relay_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("relay port: {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = RelaySettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = RelaySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.relay.max_payload_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.relay.outbound_queue_capacity, 256);
        assert_eq!(settings.relay.broadcast_queue_capacity, 256);
        assert_eq!(settings.relay.read_idle_timeout_ms, 60_000);
        assert_eq!(settings.relay.write_timeout_ms, 10_000);
        assert_eq!(settings.relay.keepalive_interval_ms, 54_000);
        assert_eq!(settings.logging.level, "info");
    }
}
