//! Transcoder stderr monitoring

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Stderr substrings that mean the upstream is unreachable
///
/// Matched case-insensitively. The transcoder tends to hang after printing
/// these instead of exiting.
pub const FATAL_PATTERNS: &[&str] = &["connection refused", "timed out", "error opening input"];

/// First fatal pattern contained in `line`
pub fn fatal_pattern(line: &str) -> Option<&'static str> {
    let lower = line.to_ascii_lowercase();
    FATAL_PATTERNS.iter().copied().find(|p| lower.contains(p))
}

/// Log stderr lines and report the first fatal one
///
/// Runs until the stream closes. Only one fatal report is sent; the
/// supervisor kills the process on receipt anyway.
pub async fn watch_stderr<R>(stderr: R, fatal_tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    let mut reported = false;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Transcoder stderr read failed");
                break;
            }
        };

        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        match fatal_pattern(line) {
            Some(pattern) if !reported => {
                tracing::warn!(line = %line, pattern, "Transcoder reported fatal error");
                reported = fatal_tx.try_send(line.to_string()).is_ok();
            }
            _ => tracing::debug!(line = %line, "Transcoder stderr"),
        }
    }
}
