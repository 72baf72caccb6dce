//! Registration gate: name checks in front of the WebSocket upgrade.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};

use super::session::run_client;
use crate::errors::RelayError;
use crate::hub::HubHandle;
use crate::metrics as m;
use crate::server::AppState;

/// Reject empty or already-connected names.
///
/// Not atomic with registration; the hub makes the final call.
pub fn check_name(hub: &HubHandle, name: &str) -> Result<(), RelayError> {
    if name.is_empty() {
        return Err(RelayError::MissingName);
    }
    if hub.is_connected(name) {
        return Err(RelayError::HandshakeRejected {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// GET /ws/{username}
///
/// The name is checked before the upgrade headers, so a taken name gets a
/// 409 even on a plain HTTP request.
pub async fn ws_upgrade(
    Path(username): Path<String>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Err(err) = check_name(&state.hub, &username) {
        if matches!(err, RelayError::HandshakeRejected { .. }) {
            counter!(m::REGISTRATIONS_REJECTED_TOTAL).increment(1);
        }
        warn!(name = %username, error = %err, "connection refused at gate");
        return err.into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(name = %username, "request is not a websocket upgrade");
            return rejection.into_response();
        }
    };

    let hub = state.hub.clone();
    let config = state.config.clone();
    let connections = state.shutdown.connections().clone();
    let limit = config.max_payload_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| connections.track_future(run_client(socket, username, hub, config)))
}

/// GET /ws and /ws/ (no name segment)
pub async fn missing_name() -> Response {
    RelayError::MissingName.into_response()
}
