//! WebSocket upgrade gate and per-connection client actors.

pub mod gate;
pub mod session;
