//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::broadcast::DEFAULT_VIEWER_QUEUE;
use crate::signaling::DEFAULT_PEER_QUEUE;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Frames queued per viewer; a full queue drops frames for that viewer
    pub viewer_queue: usize,

    /// Messages queued per signaling peer
    pub peer_queue: usize,

    /// Stats log interval
    pub stats_interval: Duration,

    /// How long a closing connection may take to flush
    pub close_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9999)),
            viewer_queue: DEFAULT_VIEWER_QUEUE,
            peer_queue: DEFAULT_PEER_QUEUE,
            stats_interval: Duration::from_secs(30),
            close_timeout: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the per-viewer queue depth (at least 1)
    pub fn viewer_queue(mut self, depth: usize) -> Self {
        self.viewer_queue = depth.max(1);
        self
    }

    /// Set the per-peer queue depth (at least 1)
    pub fn peer_queue(mut self, depth: usize) -> Self {
        self.peer_queue = depth.max(1);
        self
    }

    /// Set the stats log interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set the connection close timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}
