//! Error types for the relay
//!
//! Components keep their own error enums. [`Error`] covers the failures
//! that end the relay or a transcoder spawn: socket and pipe I/O.

use std::io;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (socket bind, process pipes)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transcoder could not be spawned
    #[error("failed to spawn transcoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}
