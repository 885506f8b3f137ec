//! camrelay: relay one camera to many browser viewers
//!
//! An external transcoder turns the camera's network stream into a sequence
//! of JPEG images. The relay keeps that process alive, cuts its output into
//! frames and fans every frame out to the connected viewers over WebSocket.
//! Viewers that want to share the feed directly negotiate through a small
//! signaling relay.
//!
//! ```text
//! camera ──► transcoder ──► stdout ──► FrameExtractor ──► BroadcastHub ──► viewers
//!              ▲
//!              └── Supervisor (spawn, watch, restart with backoff)
//!
//! peer A ──► SignalingRelay ──► peers B, C, ...
//! ```
//!
//! Delivery is lossy: a viewer whose queue is full
//! simply misses frames, and a viewer whose connection fails is dropped
//! without affecting anyone else.
//!
//! # Example
//!
//! ```no_run
//! use camrelay::server::{RelayServer, ServerConfig};
//! use camrelay::supervisor::{SupervisorConfig, TranscoderCommand};
//!
//! #[tokio::main]
//! async fn main() -> camrelay::Result<()> {
//!     let command = TranscoderCommand::new("rtsp://192.168.1.20:554/stream1");
//!     let server = RelayServer::new(ServerConfig::default(), SupervisorConfig::new(command));
//!
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod media;
pub mod registry;
pub mod server;
pub mod signaling;
pub mod stats;
pub mod supervisor;

pub use broadcast::{BroadcastHub, Frame};
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use media::FrameExtractor;
pub use server::{RelayServer, ServerConfig};
pub use signaling::{SignalMessage, SignalingRelay};
pub use supervisor::{Supervisor, SupervisorConfig, TranscoderCommand};
