//! Restart backoff
//!
//! Consecutive failures back off exponentially up to a cap. After too many in
//! a row the supervisor sits out a longer cooldown and starts over:
//!
//! ```text
//! failure:  1   2   3   4    5    6 .. 10   11    12
//! delay:    2s  4s  8s  16s  30s  30s     60s   2s
//!                                         ^ cooldown, counter reset
//! ```
//!
//! A run that stayed healthy for the stability window clears the counter.

use std::time::Duration;

/// Restart timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound on the exponential delay
    pub max_delay: Duration,
    /// Consecutive failures tolerated before the cooldown
    pub max_retries: u32,
    /// Pause after `max_retries` is exceeded
    pub cooldown: Duration,
    /// Healthy running time that clears the failure count
    pub stability_window: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_retries: 10,
            cooldown: Duration::from_secs(60),
            stability_window: Duration::from_secs(30),
        }
    }
}

impl RestartPolicy {
    /// Exponential delay for the `attempt`-th consecutive failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exp).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Set the first delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the failure count that triggers the cooldown
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the cooldown
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the stability window
    pub fn stability_window(mut self, window: Duration) -> Self {
        self.stability_window = window;
        self
    }
}

/// Consecutive-failure counter
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RestartPolicy,
    failures: u32,
    cooldowns: u64,
}

impl RetryState {
    /// Start with no failures
    pub fn new(policy: RestartPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            cooldowns: 0,
        }
    }

    /// Consecutive failures so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Number of cooldowns taken
    pub fn cooldowns(&self) -> u64 {
        self.cooldowns
    }

    /// Whether `running_for` qualifies as a stable run
    pub fn is_stable(&self, running_for: Duration) -> bool {
        running_for >= self.policy.stability_window
    }

    /// Clear the counter; returns true if there was anything to clear
    pub fn mark_stable(&mut self) -> bool {
        std::mem::replace(&mut self.failures, 0) > 0
    }

    /// Record an exit and return how long to wait before the next attempt
    ///
    /// `running_for` is how long the process had been producing output, or
    /// `None` if it never did (including spawn failures).
    pub fn record_exit(&mut self, running_for: Option<Duration>) -> Duration {
        if running_for.is_some_and(|d| self.is_stable(d)) {
            self.failures = 0;
        }

        self.failures = self.failures.saturating_add(1);

        if self.failures > self.policy.max_retries {
            self.failures = 0;
            self.cooldowns += 1;
            return self.policy.cooldown;
        }

        self.policy.delay_for(self.failures)
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(RestartPolicy::default())
    }
}
