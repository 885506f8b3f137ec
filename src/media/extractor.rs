//! Frame extraction from the transcoder's stdout
//!
//! The transcoder writes JPEG images back to back, but the pipe hands them to
//! us in arbitrary chunks: a read may end in the middle of a frame, in the
//! middle of a marker, or contain several frames at once. The extractor
//! accumulates bytes and splits off one complete `SOI..=EOI` range at a time.
//!
//! The frames produced do not depend on how the input was chunked.

use bytes::{Buf, Bytes, BytesMut};

use super::jpeg::{find_marker, EOI, SOI};

/// Default upper bound for bytes held without a complete frame (8MB)
pub const DEFAULT_MAX_PENDING_BYTES: usize = 8 * 1024 * 1024;

/// Error type for frame extraction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// A start marker was seen but no end marker arrived before the limit
    #[error("{pending} bytes pending without an end marker (limit {limit})")]
    Overflow { pending: usize, limit: usize },
}

/// Splits a raw MJPEG byte stream into complete frames
#[derive(Debug)]
pub struct FrameExtractor {
    /// Bytes not yet resolved into a frame
    buf: BytesMut,
    /// Whether `buf` currently begins with a start marker
    in_frame: bool,
    /// Offset into `buf` where the end-marker search resumes
    scan_from: usize,
    /// Maximum bytes held while waiting for an end marker
    max_pending: usize,
    /// Frames produced since creation
    frames_emitted: u64,
}

impl FrameExtractor {
    /// Create a new extractor with the default pending limit
    pub fn new() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING_BYTES)
    }

    /// Create a new extractor with a custom pending limit
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(64 * 1024),
            in_frame: false,
            scan_from: 0,
            max_pending,
            frames_emitted: 0,
        }
    }

    /// Append a chunk of transcoder output
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Split off the next complete frame, if one is available
    ///
    /// Returns `Ok(None)` when more input is needed. On overflow the pending
    /// bytes are discarded and the extractor starts over on the next push.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ExtractError> {
        if !self.in_frame {
            match find_marker(&self.buf, SOI) {
                Some(start) => {
                    self.buf.advance(start);
                    self.in_frame = true;
                    self.scan_from = SOI.len();
                }
                None => {
                    // A trailing 0xFF may be the first half of a split SOI
                    let keep = usize::from(self.buf.last() == Some(&SOI[0]));
                    let discard = self.buf.len() - keep;
                    self.buf.advance(discard);
                    return Ok(None);
                }
            }
        }

        match find_marker(&self.buf[self.scan_from..], EOI) {
            Some(offset) => {
                let end = self.scan_from + offset + EOI.len();
                let frame = self.buf.split_to(end).freeze();
                self.in_frame = false;
                self.scan_from = 0;
                self.frames_emitted += 1;
                Ok(Some(frame))
            }
            None => {
                // Resume one byte back: the last byte may start a split EOI
                self.scan_from = self.buf.len().saturating_sub(1).max(SOI.len());

                if self.buf.len() > self.max_pending {
                    let pending = self.buf.len();
                    self.reset();
                    return Err(ExtractError::Overflow {
                        pending,
                        limit: self.max_pending,
                    });
                }

                Ok(None)
            }
        }
    }

    /// Push a chunk and hand every completed frame to `emit`, in order
    ///
    /// Returns the number of frames emitted. Frames completed before an
    /// overflow are still emitted.
    pub fn feed<F>(&mut self, chunk: &[u8], mut emit: F) -> Result<usize, ExtractError>
    where
        F: FnMut(Bytes),
    {
        self.push(chunk);

        let mut count = 0;
        while let Some(frame) = self.next_frame()? {
            emit(frame);
            count += 1;
        }
        Ok(count)
    }

    /// Bytes held that do not yet form a complete frame
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Number of pending bytes
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Total frames produced
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Drop all pending bytes
    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_frame = false;
        self.scan_from = 0;
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}
