//! JPEG frame markers
//!
//! An MJPEG `image2pipe` stream is a plain concatenation of JPEG files. Each
//! one opens with Start Of Image and closes with End Of Image:
//!
//! ```text
//! FF D8 ......................... FF D9 FF D8 ......... FF D9
//! └SOI┘        entropy data       └EOI┘ └SOI┘           └EOI┘
//! ```
//!
//! The payload between the markers is never inspected.

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Find the first occurrence of a two-byte marker in `haystack`
///
/// Returns the index of the marker's first byte.
pub fn find_marker(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

/// Check whether `data` is a complete SOI..EOI frame
pub fn is_complete_frame(data: &[u8]) -> bool {
    data.len() >= 4 && data.starts_with(&SOI) && data.ends_with(&EOI)
}
