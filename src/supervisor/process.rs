//! Supervisor task
//!
//! One task owns the transcoder, the frame extractor and the retry state.
//! Each run of the process is a `select!` over four sources:
//!
//! ```text
//!   stdout bytes ──► FrameExtractor ──► BroadcastHub::publish
//!   stderr lines ──► fatal pattern?  ──► kill
//!   stall timer  ──► no bytes for N s ─► kill
//!   shutdown     ──────────────────────► kill, stop
//! ```
//!
//! When a run ends for any reason but shutdown, the retry state picks a
//! delay and the process is spawned again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::broadcast::{BroadcastHub, Frame};
use crate::media::{ExtractError, FrameExtractor};
use crate::stats::RelayStats;

use super::backoff::RetryState;
use super::config::SupervisorConfig;
use super::handle::TranscoderHandle;
use super::state::{ProcessEvent, ProcessState, Transition};
use super::stderr::watch_stderr;

/// Why a transcoder run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Relay shutting down
    Shutdown,
    /// Process could not be started
    SpawnFailed(String),
    /// Process exited (exit code, if any)
    Exited(Option<i32>),
    /// No output within the stall timeout
    Stalled,
    /// Output never completed a frame within the buffer limit
    Overflow,
    /// Stderr line that matched a fatal pattern
    Fatal(String),
    /// Reading stdout failed
    ReadFailed(String),
}

impl ExitReason {
    fn event(&self) -> ProcessEvent {
        match self {
            ExitReason::Shutdown => ProcessEvent::Shutdown,
            ExitReason::Exited(_) | ExitReason::SpawnFailed(_) => ProcessEvent::Exited,
            ExitReason::Stalled | ExitReason::Overflow => ProcessEvent::Stalled,
            ExitReason::Fatal(_) | ExitReason::ReadFailed(_) => ProcessEvent::Fatal,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Shutdown => write!(f, "shutdown"),
            ExitReason::SpawnFailed(e) => write!(f, "spawn failed: {}", e),
            ExitReason::Exited(Some(code)) => write!(f, "exited with code {}", code),
            ExitReason::Exited(None) => write!(f, "exited"),
            ExitReason::Stalled => write!(f, "stalled"),
            ExitReason::Overflow => write!(f, "frame buffer overflow"),
            ExitReason::Fatal(line) => write!(f, "fatal error: {}", line),
            ExitReason::ReadFailed(e) => write!(f, "stdout read failed: {}", e),
        }
    }
}

/// Keeps the transcoder running and feeds its frames to the hub
pub struct Supervisor {
    config: SupervisorConfig,
    hub: Arc<BroadcastHub>,
    stats: Arc<RelayStats>,
    retry: RetryState,
    state: ProcessState,
    state_tx: watch::Sender<ProcessState>,
    next_sequence: u64,
}

impl Supervisor {
    /// Create a supervisor publishing into `hub`
    pub fn new(config: SupervisorConfig, hub: Arc<BroadcastHub>, stats: Arc<RelayStats>) -> Self {
        let (state_tx, _) = watch::channel(ProcessState::Stopped);

        Self {
            retry: RetryState::new(config.policy),
            config,
            hub,
            stats,
            state: ProcessState::Stopped,
            state_tx,
            next_sequence: 0,
        }
    }

    /// Watch process state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.state_tx.subscribe()
    }

    /// Spawn the supervisor task
    pub fn start(self) -> SupervisorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = self.subscribe_state();
        let task = tokio::spawn(self.run(shutdown_rx));

        SupervisorHandle {
            state,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            program = %self.config.command.program.display(),
            source = %self.config.command.redacted_source(),
            "Supervisor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let (reason, running_for) = self.run_once(&mut shutdown).await;
            if reason == ExitReason::Shutdown {
                break;
            }

            let delay = self.retry.record_exit(running_for);
            self.stats.record_restart();

            tracing::warn!(
                reason = %reason,
                failures = self.retry.failures(),
                delay_ms = delay.as_millis() as u64,
                "Transcoder stopped, restarting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Supervisor stopped");
    }

    /// Spawn the transcoder and run it until it ends
    ///
    /// Returns why it ended and how long it had been producing output.
    async fn run_once(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> (ExitReason, Option<Duration>) {
        let mut process = match TranscoderHandle::spawn(&self.config.command) {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(error = %e, "Transcoder spawn failed");
                self.stats.record_spawn_failure();
                return (ExitReason::SpawnFailed(e.to_string()), None);
            }
        };

        self.stats.record_spawn();
        self.apply(ProcessEvent::Spawned);
        tracing::info!(pid = ?process.pid(), "Transcoder spawned");

        let (Some(mut stdout), Some(stderr)) = (process.take_stdout(), process.take_stderr())
        else {
            self.apply(ProcessEvent::Fatal);
            process.terminate().await;
            return (ExitReason::ReadFailed("pipes not captured".into()), None);
        };

        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        let stderr_task = tokio::spawn(watch_stderr(stderr, fatal_tx));

        let stall_timeout = self.config.stall_timeout;
        let mut extractor = FrameExtractor::with_max_pending(self.config.max_pending_bytes);
        let mut buf = BytesMut::with_capacity(self.config.read_buffer_size);
        let stall = tokio::time::sleep(stall_timeout);
        tokio::pin!(stall);

        let reason = loop {
            buf.clear();
            buf.reserve(self.config.read_buffer_size);

            tokio::select! {
                _ = shutdown.changed() => break ExitReason::Shutdown,
                Some(line) = fatal_rx.recv() => break ExitReason::Fatal(line),
                () = &mut stall => break ExitReason::Stalled,
                read = stdout.read_buf(&mut buf) => match read {
                    Ok(0) => break ExitReason::Exited(None),
                    Ok(n) => {
                        let now = Instant::now();
                        stall.as_mut().reset(now + stall_timeout);

                        if process.mark_data() {
                            self.apply(ProcessEvent::Output);
                            tracing::info!(pid = ?process.pid(), "Transcoder producing output");
                        }
                        self.check_stable(now);

                        self.stats.record_bytes(n as u64);
                        if let Err(e) = self.publish_frames(&mut extractor, &buf[..]).await {
                            tracing::warn!(error = %e, "Discarding transcoder output");
                            break ExitReason::Overflow;
                        }
                    }
                    Err(e) => break ExitReason::ReadFailed(e.to_string()),
                },
            }
        };

        let running_for = self.state.running_for(Instant::now());
        let transition = self.apply(reason.event());

        let mut reason = reason;
        let status = if transition.kill {
            process.terminate().await
        } else {
            // The child may close stdout and linger; shutdown must not wait it out
            let exited = tokio::select! {
                status = process.wait_or_kill(stall_timeout) => Some(status),
                _ = shutdown.changed() => None,
            };
            match exited {
                Some(status) => status,
                None => {
                    reason = ExitReason::Shutdown;
                    process.terminate().await
                }
            }
        };

        // Let stderr drain its last lines into the log
        let _ = tokio::time::timeout(Duration::from_secs(1), stderr_task).await;

        let reason = match reason {
            ExitReason::Exited(_) => ExitReason::Exited(status.and_then(|s| s.code())),
            ExitReason::Stalled | ExitReason::Overflow => {
                self.stats.record_stall();
                reason
            }
            ExitReason::Fatal(_) => {
                self.stats.record_fatal();
                reason
            }
            other => other,
        };

        (reason, running_for)
    }

    /// Extract and publish every frame completed by `chunk`
    async fn publish_frames(
        &mut self,
        extractor: &mut FrameExtractor,
        chunk: &[u8],
    ) -> Result<(), ExtractError> {
        extractor.push(chunk);

        while let Some(data) = extractor.next_frame()? {
            self.next_sequence += 1;
            let report = self.hub.publish(Frame::new(self.next_sequence, data)).await;
            self.stats.record_frame(&report);
        }

        Ok(())
    }

    /// Clear the failure count once the current run has proven stable
    fn check_stable(&mut self, now: Instant) {
        let Some(running_for) = self.state.running_for(now) else {
            return;
        };

        if self.retry.is_stable(running_for) && self.retry.mark_stable() {
            tracing::info!(
                running_secs = running_for.as_secs(),
                "Transcoder stable, failure count cleared"
            );
        }
    }

    fn apply(&mut self, event: ProcessEvent) -> Transition {
        let transition = self.state.on_event(event, Instant::now());

        if transition.next != self.state {
            tracing::debug!(from = %self.state, to = %transition.next, ?event, "Transcoder state");
            self.state = transition.next;
            self.state_tx.send_replace(self.state);
        }

        transition
    }
}

/// Control handle for a running [`Supervisor`]
pub struct SupervisorHandle {
    state: watch::Receiver<ProcessState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Current process state
    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Watch process state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.state.clone()
    }

    /// Whether the supervisor task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the supervisor, killing the transcoder, and wait for it
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);

        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Supervisor task failed");
        }
    }
}
