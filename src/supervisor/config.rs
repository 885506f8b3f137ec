//! Supervisor configuration

use std::time::Duration;

use crate::media::DEFAULT_MAX_PENDING_BYTES;

use super::backoff::RestartPolicy;
use super::command::TranscoderCommand;

/// Supervisor configuration options
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Transcoder invocation
    pub command: TranscoderCommand,

    /// Restart timing
    pub policy: RestartPolicy,

    /// Longest silence on stdout (before or after the first byte)
    pub stall_timeout: Duration,

    /// Bytes read from stdout per call
    pub read_buffer_size: usize,

    /// Accumulator bound for the frame extractor
    pub max_pending_bytes: usize,
}

impl SupervisorConfig {
    /// Default settings for `command`
    pub fn new(command: TranscoderCommand) -> Self {
        Self {
            command,
            policy: RestartPolicy::default(),
            stall_timeout: Duration::from_secs(15),
            read_buffer_size: 64 * 1024, // 64KB
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }

    /// Set the restart policy
    pub fn policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the stall timeout
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the stdout read size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Set the extractor's accumulator bound
    pub fn max_pending_bytes(mut self, limit: usize) -> Self {
        self.max_pending_bytes = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::new(TranscoderCommand::new("rtsp://cam"));

        assert_eq!(config.stall_timeout, Duration::from_secs(15));
        assert_eq!(config.policy, RestartPolicy::default());
        assert_eq!(config.policy.stability_window, Duration::from_secs(30));
        assert_eq!(config.max_pending_bytes, DEFAULT_MAX_PENDING_BYTES);
    }

    #[test]
    fn test_builder_chaining() {
        let config = SupervisorConfig::new(TranscoderCommand::new("rtsp://cam"))
            .stall_timeout(Duration::from_secs(5))
            .read_buffer_size(0)
            .max_pending_bytes(1024)
            .policy(RestartPolicy::default().max_retries(3));

        assert_eq!(config.stall_timeout, Duration::from_secs(5));
        assert_eq!(config.read_buffer_size, 1);
        assert_eq!(config.max_pending_bytes, 1024);
        assert_eq!(config.policy.max_retries, 3);
    }
}
