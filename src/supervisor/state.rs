//! Transcoder process state machine
//!
//! ```text
//!            Spawned            Output
//! Stopped ──────────► Starting ────────► Running ─┐ Output
//!    ▲                   │                  │  ◄──┘
//!    │ Exited/Stalled/   │                  │
//!    └─ Fatal/Shutdown ──┴──────────────────┘
//! ```
//!
//! Transitions are pure: the supervisor feeds events in and acts on the
//! returned [`Transition`].

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Lifecycle state of the transcoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessState {
    /// No process
    #[default]
    Stopped,
    /// Spawned, no output yet
    Starting {
        /// When the process was spawned
        since: Instant,
    },
    /// Producing output
    Running {
        /// When the first output arrived
        since: Instant,
    },
}

/// Something observed about the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Child process spawned
    Spawned,
    /// Bytes read from stdout
    Output,
    /// No output within the stall timeout
    Stalled,
    /// Stderr reported an unrecoverable error
    Fatal,
    /// Process exited on its own (or stdout closed)
    Exited,
    /// Relay is shutting down
    Shutdown,
}

/// Result of applying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State after the event
    pub next: ProcessState,
    /// Whether the running child must be killed
    pub kill: bool,
}

impl ProcessState {
    /// Apply `event` observed at `now`
    pub fn on_event(self, event: ProcessEvent, now: Instant) -> Transition {
        use ProcessEvent::*;
        use ProcessState::*;

        let (next, kill) = match (self, event) {
            (Stopped, Spawned) => (Starting { since: now }, false),
            (Starting { .. }, Output) => (Running { since: now }, false),
            (Starting { .. } | Running { .. }, Stalled | Fatal | Shutdown) => (Stopped, true),
            (_, Exited) => (Stopped, false),
            // Late output after a kill, duplicate spawn notices, etc.
            (state, _) => (state, false),
        };

        Transition { next, kill }
    }

    /// How long the process has been producing output
    pub fn running_for(&self, now: Instant) -> Option<Duration> {
        match self {
            ProcessState::Running { since } => Some(now.saturating_duration_since(*since)),
            _ => None,
        }
    }

    /// Whether a child process exists
    pub fn is_alive(&self) -> bool {
        !matches!(self, ProcessState::Stopped)
    }

    /// Short lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting { .. } => "starting",
            ProcessState::Running { .. } => "running",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(3);

        let starting = ProcessState::Stopped.on_event(ProcessEvent::Spawned, t0);
        assert_eq!(starting.next, ProcessState::Starting { since: t0 });
        assert!(!starting.kill);

        let running = starting.next.on_event(ProcessEvent::Output, t1);
        assert_eq!(running.next, ProcessState::Running { since: t1 });

        // More output keeps the original start
        let still = running
            .next
            .on_event(ProcessEvent::Output, t1 + Duration::from_secs(5));
        assert_eq!(still.next, ProcessState::Running { since: t1 });
    }

    #[test]
    fn test_stall_while_starting_kills() {
        let t0 = Instant::now();
        let state = ProcessState::Starting { since: t0 };

        let t = state.on_event(ProcessEvent::Stalled, t0 + Duration::from_secs(15));
        assert_eq!(t.next, ProcessState::Stopped);
        assert!(t.kill);
    }

    #[test]
    fn test_fatal_while_running_kills() {
        let t0 = Instant::now();
        let t = ProcessState::Running { since: t0 }.on_event(ProcessEvent::Fatal, t0);

        assert_eq!(t.next, ProcessState::Stopped);
        assert!(t.kill);
    }

    #[test]
    fn test_shutdown_kills_live_process() {
        let t0 = Instant::now();
        let t = ProcessState::Starting { since: t0 }.on_event(ProcessEvent::Shutdown, t0);
        assert!(t.kill);

        let t = ProcessState::Stopped.on_event(ProcessEvent::Shutdown, t0);
        assert_eq!(t.next, ProcessState::Stopped);
        assert!(!t.kill);
    }

    #[test]
    fn test_exit_does_not_kill() {
        let t0 = Instant::now();
        for state in [
            ProcessState::Starting { since: t0 },
            ProcessState::Running { since: t0 },
        ] {
            let t = state.on_event(ProcessEvent::Exited, t0);
            assert_eq!(t.next, ProcessState::Stopped);
            assert!(!t.kill);
        }
    }

    #[test]
    fn test_stopped_ignores_output_and_stall() {
        let t0 = Instant::now();
        for event in [ProcessEvent::Output, ProcessEvent::Stalled, ProcessEvent::Fatal] {
            let t = ProcessState::Stopped.on_event(event, t0);
            assert_eq!(t.next, ProcessState::Stopped);
            assert!(!t.kill);
        }
    }

    #[test]
    fn test_running_for() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(31);

        assert_eq!(
            ProcessState::Running { since: t0 }.running_for(later),
            Some(Duration::from_secs(31))
        );
        assert_eq!(ProcessState::Starting { since: t0 }.running_for(later), None);
        assert_eq!(ProcessState::Stopped.running_for(later), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(ProcessState::Stopped.to_string(), "stopped");
        assert_eq!(
            ProcessState::Starting {
                since: Instant::now()
            }
            .name(),
            "starting"
        );
        assert!(!ProcessState::Stopped.is_alive());
    }
}
