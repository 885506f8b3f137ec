//! Transcoder process supervision
//!
//! The supervisor keeps one external transcoder (ffmpeg) alive, turns its
//! stdout into frames and restarts it with backoff when it exits, stalls or
//! reports an unreachable upstream.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use camrelay::broadcast::BroadcastHub;
//! use camrelay::stats::RelayStats;
//! use camrelay::supervisor::{Supervisor, SupervisorConfig, TranscoderCommand};
//!
//! # async fn example() {
//! let hub = Arc::new(BroadcastHub::new());
//! let command = TranscoderCommand::new("rtsp://192.168.1.20:554/stream1").size(640, 480);
//! let handle = Supervisor::new(SupervisorConfig::new(command), hub, Arc::new(RelayStats::new())).start();
//!
//! // ... later
//! handle.shutdown().await;
//! # }
//! ```

pub mod backoff;
pub mod command;
pub mod config;
pub mod handle;
pub mod process;
pub mod state;
pub mod stderr;

pub use backoff::{RestartPolicy, RetryState};
pub use command::TranscoderCommand;
pub use config::SupervisorConfig;
pub use handle::TranscoderHandle;
pub use process::{ExitReason, Supervisor, SupervisorHandle};
pub use state::{ProcessEvent, ProcessState, Transition};
pub use stderr::{fatal_pattern, FATAL_PATTERNS};
