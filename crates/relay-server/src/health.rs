//! `/health` endpoint.

use serde::Serialize;

use crate::deployment::{DeploymentInfo, SERVER_VERSION, rfc3339};
use crate::hub::ServerSnapshot;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` when the server is running.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Build metadata.
    pub deployment: DeploymentInfo,
    /// Uptime and clock.
    pub server: ServerStatus,
    /// Hub counters and derived rates.
    pub metrics: RelayMetrics,
}

/// Server clock section.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    /// Seconds since the hub started.
    pub uptime_seconds: f64,
    /// Hub start time.
    pub start_time: String,
    /// Snapshot capture time.
    pub current_time: String,
}

/// Relay counters section.
#[derive(Debug, Clone, Serialize)]
pub struct RelayMetrics {
    /// Number of live clients.
    pub connected_users: usize,
    /// Live client names, sorted.
    pub users: Vec<String>,
    /// Clients ever registered.
    pub total_connections: u64,
    /// Messages accepted for fan-out.
    pub total_messages: u64,
    /// Payload bytes accepted for fan-out.
    pub total_bytes_relayed: u64,
    /// Clients evicted for a full outbound queue.
    pub total_evictions: u64,
    /// Average messages per second.
    pub messages_per_second: f64,
    /// Average bandwidth in megabits per second.
    pub bandwidth_mbps: f64,
}

/// Build a health response from one snapshot.
pub fn health_check(snapshot: &ServerSnapshot, deployment: &DeploymentInfo) -> HealthResponse {
    HealthResponse {
        status: "healthy".into(),
        version: SERVER_VERSION.into(),
        deployment: deployment.clone(),
        server: ServerStatus {
            uptime_seconds: snapshot.uptime.as_secs_f64(),
            start_time: rfc3339(snapshot.started_at),
            current_time: rfc3339(snapshot.taken_at),
        },
        metrics: RelayMetrics {
            connected_users: snapshot.connected_users(),
            users: snapshot.users.clone(),
            total_connections: snapshot.stats.total_connections,
            total_messages: snapshot.stats.total_messages,
            total_bytes_relayed: snapshot.stats.total_bytes_relayed,
            total_evictions: snapshot.stats.total_evictions,
            messages_per_second: snapshot.messages_per_second(),
            bandwidth_mbps: snapshot.bandwidth_mbps(),
        },
    }
}
