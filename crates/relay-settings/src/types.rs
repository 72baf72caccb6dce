//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! settings file only needs the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the relay server.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "relay": { "outboundQueueCapacity": 512 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network binding.
    pub server: ServerSettings,
    /// Connection limits, queue sizes and deadlines.
    pub relay: RelayLimits,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Check cross-field constraints.
    ///
    /// The keepalive interval must be shorter than the read-idle deadline,
    /// otherwise every quiet peer would be dropped between two pings.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.relay;
        if limits.max_payload_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.maxPayloadBytes must be greater than zero".into(),
            ));
        }
        if limits.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.outboundQueueCapacity must be greater than zero".into(),
            ));
        }
        if limits.broadcast_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.broadcastQueueCapacity must be greater than zero".into(),
            ));
        }
        if limits.write_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.writeTimeoutMs must be greater than zero".into(),
            ));
        }
        if limits.keepalive_interval_ms == 0
            || limits.keepalive_interval_ms >= limits.read_idle_timeout_ms
        {
            return Err(SettingsError::InvalidValue(format!(
                "relay.keepaliveIntervalMs ({}) must be non-zero and shorter than relay.readIdleTimeoutMs ({})",
                limits.keepalive_interval_ms, limits.read_idle_timeout_ms
            )));
        }
        Ok(())
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Per-connection limits and hub queue sizes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayLimits {
    /// Largest inbound payload accepted from a client, in bytes.
    pub max_payload_bytes: usize,
    /// Pending payloads a client may have queued before it is evicted.
    pub outbound_queue_capacity: usize,
    /// Buffered messages between client ingest loops and the hub.
    pub broadcast_queue_capacity: usize,
    /// Close a connection after this long without a keepalive response.
    pub read_idle_timeout_ms: u64,
    /// Deadline for a single frame write.
    pub write_timeout_ms: u64,
    /// Interval between server-initiated ping frames.
    pub keepalive_interval_ms: u64,
    /// How long shutdown waits for connections to drain.
    pub shutdown_timeout_ms: u64,
}

impl Default for RelayLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 10 * 1024 * 1024,
            outbound_queue_capacity: 256,
            broadcast_queue_capacity: 256,
            read_idle_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
            keepalive_interval_ms: 54_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`RUST_LOG` still wins when set).
    pub level: String,
    /// Output format: `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
