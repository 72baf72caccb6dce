//! Relay error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that end a registration attempt or a single connection, plus
/// configuration rejected at server construction.
///
/// None of these is retried and none is fatal to the hub.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The upgrade path carried an empty username.
    #[error("Username required in URL")]
    MissingName,
    /// Another live connection already owns the name.
    #[error("Username already connected")]
    HandshakeRejected {
        /// The contested name.
        name: String,
    },
    /// Reading a frame from the peer failed.
    #[error("read failure: {0}")]
    ReadFailure(String),
    /// Writing a frame to the peer failed or timed out.
    #[error("write failure: {0}")]
    WriteFailure(String),
    /// The client's outbound queue overflowed and it was dropped.
    #[error("client {name} evicted: outbound queue full")]
    Evicted {
        /// The evicted client's name.
        name: String,
    },
    /// The hub control loop is gone (shutdown).
    #[error("hub is shut down")]
    HubClosed,
    /// A server limit is out of range.
    #[error("invalid server config: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// HTTP status used when the error is reported at the upgrade boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingName => StatusCode::BAD_REQUEST,
            Self::HandshakeRejected { .. } => StatusCode::CONFLICT,
            Self::HubClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::ReadFailure(_)
            | Self::WriteFailure(_)
            | Self::Evicted { .. }
            | Self::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
