//! Media handling for the relay
//!
//! This module provides:
//! - JPEG start/end marker definitions
//! - Frame extraction from a raw `image2pipe` byte stream

pub mod extractor;
pub mod jpeg;

pub use extractor::{ExtractError, FrameExtractor, DEFAULT_MAX_PENDING_BYTES};
pub use jpeg::{find_marker, EOI, SOI};
