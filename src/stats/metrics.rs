//! Relay statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::registry::DeliveryReport;

/// Live counters shared by the supervisor and the connection handlers
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    bytes_received: AtomicU64,
    frames_published: AtomicU64,
    frames_delivered: AtomicU64,
    frames_skipped: AtomicU64,
    subscribers_removed: AtomicU64,
    spawns: AtomicU64,
    spawn_failures: AtomicU64,
    restarts: AtomicU64,
    stalls: AtomicU64,
    fatal_errors: AtomicU64,
    signals_relayed: AtomicU64,
    signals_malformed: AtomicU64,
}

impl RelayStats {
    /// Start counting from now
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_received: AtomicU64::new(0),
            frames_published: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            subscribers_removed: AtomicU64::new(0),
            spawns: AtomicU64::new(0),
            spawn_failures: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
            fatal_errors: AtomicU64::new(0),
            signals_relayed: AtomicU64::new(0),
            signals_malformed: AtomicU64::new(0),
        }
    }

    /// Transcoder stdout bytes read
    pub fn record_bytes(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    /// One frame fanned out to viewers
    pub fn record_frame(&self, report: &DeliveryReport) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
        self.frames_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.frames_skipped
            .fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.subscribers_removed
            .fetch_add(report.removed as u64, Ordering::Relaxed);
    }

    /// One signaling message relayed to peers
    pub fn record_signal(&self, report: &DeliveryReport) {
        self.signals_relayed.fetch_add(1, Ordering::Relaxed);
        self.subscribers_removed
            .fetch_add(report.removed as u64, Ordering::Relaxed);
    }

    /// Signaling text that did not parse
    pub fn record_malformed_signal(&self) {
        self.signals_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Transcoder process spawned
    pub fn record_spawn(&self) {
        self.spawns.fetch_add(1, Ordering::Relaxed);
    }

    /// Transcoder process could not be spawned
    pub fn record_spawn_failure(&self) {
        self.spawn_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Restart scheduled
    pub fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    /// Transcoder killed for silence or runaway buffering
    pub fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    /// Transcoder killed after a fatal stderr line
    pub fn record_fatal(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the relay started
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        StatsSnapshot {
            uptime_secs: self.uptime().as_secs(),
            bytes_received: load(&self.bytes_received),
            frames_published: load(&self.frames_published),
            frames_delivered: load(&self.frames_delivered),
            frames_skipped: load(&self.frames_skipped),
            subscribers_removed: load(&self.subscribers_removed),
            spawns: load(&self.spawns),
            spawn_failures: load(&self.spawn_failures),
            restarts: load(&self.restarts),
            stalls: load(&self.stalls),
            fatal_errors: load(&self.fatal_errors),
            signals_relayed: load(&self.signals_relayed),
            signals_malformed: load(&self.signals_malformed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Seconds since start
    pub uptime_secs: u64,
    /// Transcoder output bytes
    pub bytes_received: u64,
    /// Frames extracted and fanned out
    pub frames_published: u64,
    /// Frame copies handed to viewers
    pub frames_delivered: u64,
    /// Frame copies dropped because a viewer was busy
    pub frames_skipped: u64,
    /// Viewers and peers dropped after a send failure
    pub subscribers_removed: u64,
    /// Successful transcoder spawns
    pub spawns: u64,
    /// Failed transcoder spawns
    pub spawn_failures: u64,
    /// Restarts scheduled
    pub restarts: u64,
    /// Kills for stalled output
    pub stalls: u64,
    /// Kills for fatal stderr lines
    pub fatal_errors: u64,
    /// Signaling messages relayed
    pub signals_relayed: u64,
    /// Signaling messages rejected as malformed
    pub signals_malformed: u64,
}

impl StatsSnapshot {
    /// Average input bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        if self.uptime_secs > 0 {
            (self.bytes_received * 8) / self.uptime_secs
        } else {
            0
        }
    }

    /// Average published frames per second
    pub fn frame_rate(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.frames_published as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let snap = RelayStats::new().snapshot();

        assert_eq!(
            snap,
            StatsSnapshot {
                uptime_secs: snap.uptime_secs,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_record_frame() {
        let stats = RelayStats::new();
        stats.record_bytes(4096);
        stats.record_frame(&DeliveryReport {
            delivered: 3,
            skipped: 1,
            removed: 1,
        });
        stats.record_frame(&DeliveryReport {
            delivered: 2,
            skipped: 0,
            removed: 0,
        });

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_received, 4096);
        assert_eq!(snap.frames_published, 2);
        assert_eq!(snap.frames_delivered, 5);
        assert_eq!(snap.frames_skipped, 1);
        assert_eq!(snap.subscribers_removed, 1);
    }

    #[test]
    fn test_process_counters() {
        let stats = RelayStats::new();
        stats.record_spawn();
        stats.record_spawn_failure();
        stats.record_restart();
        stats.record_restart();
        stats.record_stall();
        stats.record_fatal();

        let snap = stats.snapshot();
        assert_eq!(snap.spawns, 1);
        assert_eq!(snap.spawn_failures, 1);
        assert_eq!(snap.restarts, 2);
        assert_eq!(snap.stalls, 1);
        assert_eq!(snap.fatal_errors, 1);
    }

    #[test]
    fn test_signal_counters() {
        let stats = RelayStats::new();
        stats.record_signal(&DeliveryReport {
            delivered: 1,
            skipped: 0,
            removed: 2,
        });
        stats.record_malformed_signal();

        let snap = stats.snapshot();
        assert_eq!(snap.signals_relayed, 1);
        assert_eq!(snap.signals_malformed, 1);
        assert_eq!(snap.subscribers_removed, 2);
        assert_eq!(snap.frames_delivered, 0);
    }

    #[test]
    fn test_bitrate() {
        let snap = StatsSnapshot {
            uptime_secs: 10,
            bytes_received: 1_000_000,
            frames_published: 150,
            ..Default::default()
        };

        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(snap.bitrate(), 800_000);
        assert_eq!(snap.frame_rate(), 15.0);
    }

    #[test]
    fn test_bitrate_zero_uptime() {
        let snap = StatsSnapshot {
            bytes_received: 1_000_000,
            ..Default::default()
        };

        assert_eq!(snap.bitrate(), 0);
        assert_eq!(snap.frame_rate(), 0.0);
    }

    #[test]
    fn test_snapshot_json() {
        let snap = StatsSnapshot {
            restarts: 3,
            ..Default::default()
        };
        let value = serde_json::to_value(&snap).unwrap();

        assert_eq!(value["restarts"], 3);
        assert_eq!(value["frames_published"], 0);
    }
}
