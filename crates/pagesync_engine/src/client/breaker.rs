//! Three-state circuit breaker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests fail fast.
    Open,
    /// One trial request is admitted.
    HalfOpen,
}

impl CircuitState {
    /// Returns the display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }

    /// Returns true when requests may flow freely.
    pub fn is_closed(&self) -> bool {
        matches!(self, CircuitState::Closed)
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    threshold: u32,
    check_interval: Duration,
    opened_at: Option<Instant>,
    trial_started: Option<Instant>,
    last_success: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub(crate) fn new(threshold: u32, check_interval: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            threshold: threshold.max(1),
            check_interval,
            opened_at: None,
            trial_started: None,
            last_success: None,
        }
    }

    /// Admits or rejects a call. `Err` carries the time until a trial.
    ///
    /// Half-open admits a single trial; a trial that never reports back
    /// is replaced after another check interval.
    pub(crate) fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        match self.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened = self.opened_at.unwrap_or(now);
                let elapsed = now.duration_since(opened);
                if elapsed < self.check_interval {
                    return Err(self.check_interval - elapsed);
                }
                self.state = CircuitState::HalfOpen;
                self.trial_started = Some(now);
                Ok(())
            }
            CircuitState::HalfOpen => match self.trial_started {
                Some(started) if now.duration_since(started) < self.check_interval => {
                    Err(self.check_interval - now.duration_since(started))
                }
                _ => {
                    self.trial_started = Some(now);
                    Ok(())
                }
            },
        }
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.trial_started = None;
        self.last_success = Some(Utc::now());
    }

    /// Counts a failure. Returns true when this call opened the circuit.
    pub(crate) fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let should_open = match self.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => self.consecutive_failures >= self.threshold,
            CircuitState::Open => false,
        };
        if should_open {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
            self.trial_started = None;
        }
        should_open
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }
}
