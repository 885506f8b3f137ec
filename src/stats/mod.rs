//! Relay statistics
//!
//! Counters are updated lock-free from the supervisor and connection tasks,
//! logged periodically by the server, and served on `/health`.

pub mod metrics;

pub use metrics::{RelayStats, StatsSnapshot};
