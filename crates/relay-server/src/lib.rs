//! # relay-server
//!
//! Content-agnostic WebSocket message relay.
//!
//! - Hub: one control loop owns the live-client table and fans every message
//!   out to all other clients through bounded per-client queues
//! - Client actors: ingest and dispatch loops per connection, with read-idle,
//!   write and keepalive deadlines
//! - Slow consumers are evicted instead of blocking the hub
//! - HTTP endpoints: `/ws/{username}`, `/health`, `/test/benchmark`, `/metrics`
//! - Graceful drain via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod deployment;
pub mod errors;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod report;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use deployment::DeploymentInfo;
pub use errors::RelayError;
pub use hub::{HubHandle, Message, ServerSnapshot};
pub use server::RelayServer;
