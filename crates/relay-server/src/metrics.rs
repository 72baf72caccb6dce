//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Connections registered with the hub (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Connections that ended (counter).
pub const DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Live connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Messages accepted for fan-out (counter).
pub const MESSAGES_TOTAL: &str = "relay_messages_total";
/// Payload bytes accepted for fan-out (counter).
pub const BYTES_RELAYED_TOTAL: &str = "relay_bytes_relayed_total";
/// Clients evicted for a full outbound queue (counter).
pub const EVICTIONS_TOTAL: &str = "relay_evictions_total";
/// Registrations refused because the name was taken (counter).
pub const REGISTRATIONS_REJECTED_TOTAL: &str = "relay_registrations_rejected_total";
/// Connection lifetime in seconds (histogram).
pub const CONNECTION_DURATION_SECONDS: &str = "relay_connection_duration_seconds";
