//! Running transcoder process

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::time::Instant;

use crate::error::{Error, Result};

use super::command::TranscoderCommand;

/// One spawned transcoder
///
/// Dropping the handle kills the child.
#[derive(Debug)]
pub struct TranscoderHandle {
    child: Child,
    pid: Option<u32>,
    started_at: Instant,
    received_data: bool,
}

impl TranscoderHandle {
    /// Spawn `command`
    pub fn spawn(command: &TranscoderCommand) -> Result<Self> {
        let child = command.build().spawn().map_err(|source| Error::Spawn {
            program: command.program.display().to_string(),
            source,
        })?;

        Ok(Self {
            pid: child.id(),
            child,
            started_at: Instant::now(),
            received_data: false,
        })
    }

    /// OS process ID (None once reaped)
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the process was spawned
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Whether any stdout bytes have arrived
    pub fn received_data(&self) -> bool {
        self.received_data
    }

    /// Note that stdout produced data; returns true the first time
    pub fn mark_data(&mut self) -> bool {
        !std::mem::replace(&mut self.received_data, true)
    }

    /// Take the stdout pipe
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the stderr pipe
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Kill the process and reap it
    pub async fn terminate(&mut self) -> Option<ExitStatus> {
        if let Err(e) = self.child.start_kill() {
            // Already exited
            tracing::debug!(pid = ?self.pid, error = %e, "Transcoder kill failed");
        }
        self.reap().await
    }

    /// Wait up to `timeout` for the process to exit, then kill it
    pub async fn wait_or_kill(&mut self, timeout: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.pid = None;
                Some(status)
            }
            Ok(Err(e)) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Transcoder wait failed");
                None
            }
            Err(_) => {
                tracing::warn!(pid = ?self.pid, "Transcoder closed stdout but did not exit");
                self.terminate().await
            }
        }
    }

    async fn reap(&mut self) -> Option<ExitStatus> {
        match self.child.wait().await {
            Ok(status) => {
                self.pid = None;
                Some(status)
            }
            Err(e) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Transcoder wait failed");
                None
            }
        }
    }
}
