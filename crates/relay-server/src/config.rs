//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

use crate::errors::RelayError;

/// Configuration for the relay server.
///
/// Fixed for the lifetime of the process; every client actor reads the same
/// limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_payload_bytes: usize,
    /// Capacity of each client's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Capacity of the hub's broadcast-in channel.
    pub broadcast_queue_capacity: usize,
    /// Read-idle deadline in milliseconds.
    pub read_idle_timeout_ms: u64,
    /// Per-frame write deadline in milliseconds.
    pub write_timeout_ms: u64,
    /// Keepalive ping interval in milliseconds.
    pub keepalive_interval_ms: u64,
    /// Drain budget on shutdown in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl ServerConfig {
    /// Read-idle deadline.
    pub fn read_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.read_idle_timeout_ms)
    }

    /// Per-frame write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Keepalive ping interval.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Drain budget on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Reject limits the client actors cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        let positive = [
            ("max_payload_bytes", self.max_payload_bytes as u64),
            ("outbound_queue_capacity", self.outbound_queue_capacity as u64),
            ("broadcast_queue_capacity", self.broadcast_queue_capacity as u64),
            ("write_timeout_ms", self.write_timeout_ms),
            ("keepalive_interval_ms", self.keepalive_interval_ms),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(RelayError::InvalidConfig(format!(
                "{field} must be greater than zero"
            )));
        }
        if self.keepalive_interval_ms >= self.read_idle_timeout_ms {
            return Err(RelayError::InvalidConfig(format!(
                "keepalive_interval_ms ({}) must be shorter than read_idle_timeout_ms ({})",
                self.keepalive_interval_ms, self.read_idle_timeout_ms
            )));
        }
        Ok(())
    }

    /// `host:port` string suitable for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            max_payload_bytes: 10 * 1024 * 1024, // 10 MiB
            outbound_queue_capacity: 256,
            broadcast_queue_capacity: 256,
            read_idle_timeout_ms: 60_000,
            write_timeout_ms: 10_000,
            keepalive_interval_ms: 54_000,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let limits = &settings.relay;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_payload_bytes: limits.max_payload_bytes,
            outbound_queue_capacity: limits.outbound_queue_capacity,
            broadcast_queue_capacity: limits.broadcast_queue_capacity,
            read_idle_timeout_ms: limits.read_idle_timeout_ms,
            write_timeout_ms: limits.write_timeout_ms,
            keepalive_interval_ms: limits.keepalive_interval_ms,
            shutdown_timeout_ms: limits.shutdown_timeout_ms,
        }
    }
}
