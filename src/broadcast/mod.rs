//! Frame fan-out to viewers
//!
//! The hub receives frames from the supervisor in extraction order and pushes
//! each one to every connected viewer that can take it right now. Viewers
//! that fall behind lose frames; they never slow down the stream.
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so all viewers share the same
//! allocation for a frame. Cloning a [`Frame`] per viewer only bumps a count.

pub mod frame;
pub mod hub;

pub use frame::Frame;
pub use hub::{BroadcastHub, DEFAULT_VIEWER_QUEUE};
