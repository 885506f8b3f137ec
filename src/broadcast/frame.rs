//! Broadcast frame type

use bytes::Bytes;

/// One complete still image, ready to be sent to viewers
///
/// This is designed to be cheap to clone due to `Bytes` reference counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position in the relay's output, starting at 1
    pub sequence: u64,
    /// JPEG data from SOI through EOI inclusive
    pub data: Bytes,
}

impl Frame {
    /// Create a frame
    pub fn new(sequence: u64, data: Bytes) -> Self {
        Self { sequence, data }
    }

    /// Size of the image in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the frame carries no data
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
