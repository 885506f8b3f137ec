//! HTTP/WebSocket front end
//!
//! The server owns the hub, the signaling relay, the counters and the
//! supervisor task, and exposes them over one listener.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::{router, AppState, HealthReport, RelayServer};
