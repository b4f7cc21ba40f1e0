//! Circuit breaker for outbound tool calls.
//!
//! Tracks consecutive failures against one backend. At the threshold the
//! circuit opens and calls fail fast without touching the wire; after the
//! cooldown a single trial call is let through, and its outcome decides
//! between closing the circuit and re-opening it for another cooldown.

use crate::types::{AppError, Result};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Failing fast until the cooldown elapses.
    Open,
    /// Cooldown elapsed; one trial call is in flight.
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker for one backend.
pub struct CircuitBreaker {
    target: String,
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Breaker that opens after `threshold` consecutive failures and allows
    /// a trial call after `cooldown`.
    pub fn new(target: impl Into<String>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            target: target.into(),
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Gate a call. Open circuits fail fast with a tool-call error; an open
    /// circuit past its cooldown moves to half-open and admits this caller
    /// as the trial.
    pub fn check(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Err(AppError::ToolCall(format!(
                "circuit half-open for {}: trial call in flight",
                self.target
            ))),
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.cooldown);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    info!(target = %self.target, "circuit half-open, admitting trial call");
                    Ok(())
                } else {
                    Err(AppError::ToolCall(format!(
                        "circuit open for {}",
                        self.target
                    )))
                }
            }
        }
    }

    /// Record a successful call. Closes the circuit and clears the count.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            info!(target = %self.target, "circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Record a failed call. A failed trial re-opens immediately; a closed
    /// circuit opens once the threshold is reached.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(target = %self.target, "trial call failed, circuit re-opened");
            }
            CircuitState::Closed if inner.consecutive_failures >= self.threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(
                    target = %self.target,
                    failures = inner.consecutive_failures,
                    "circuit opened"
                );
            }
            _ => {}
        }
    }

    /// Current position.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}
