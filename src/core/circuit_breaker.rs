//! Per-route circuit breaker.
//!
//! ```text
//! Closed   --(consecutive failures reach threshold)-->  Open
//! Open     --(break duration elapsed, one caller wins CAS)-->  HalfOpen
//! HalfOpen --(trial succeeds)-->  Closed
//! HalfOpen --(trial fails)-->  Open (break timer restarts)
//! ```
//!
//! State and open timestamp share one atomic word, so every transition is a
//! single compare-and-swap and admission never takes a lock. While half-open
//! exactly one trial call is in flight; every other caller is rejected until
//! it resolves.
use std::{
    fmt,
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
    time::Duration,
};

use tokio::time::Instant;

use crate::{core::error::CircuitOpenError, metrics::set_circuit_state};

const STATE_CLOSED: u64 = 0;
const STATE_OPEN: u64 = 1;
const STATE_HALF_OPEN: u64 = 2;
const STATE_MASK: u64 = 0b11;

/// Low two bits hold the state, the rest the open timestamp in nanoseconds.
fn pack(state: u64, opened_at: u64) -> u64 {
    (opened_at << 2) | state
}

fn unpack(word: u64) -> (u64, u64) {
    (word & STATE_MASK, word >> 2)
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn from_bits(value: u64) -> Self {
        match value {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    /// Gauge value reported to metrics.
    pub fn as_gauge(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

pub struct CircuitBreaker {
    route: String,
    failure_threshold: u32,
    break_duration: Duration,
    state: AtomicU64,
    consecutive_failures: AtomicU32,
    epoch: Instant,
}

impl CircuitBreaker {
    /// `failure_threshold` is clamped to at least one.
    pub fn new(route: impl Into<String>, failure_threshold: u32, break_duration: Duration) -> Self {
        Self {
            route: route.into(),
            failure_threshold: failure_threshold.max(1),
            break_duration,
            state: AtomicU64::new(pack(STATE_CLOSED, 0)),
            consecutive_failures: AtomicU32::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        let (state, _) = unpack(self.state.load(Ordering::Acquire));
        CircuitState::from_bits(state)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn break_duration(&self) -> Duration {
        self.break_duration
    }

    /// Ask to let a call through.
    ///
    /// The returned permit must be resolved with [`CircuitPermit::succeed`] or
    /// [`CircuitPermit::fail`]. Dropping an unresolved permit records no
    /// outcome; a dropped trial puts the circuit back to open.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>, CircuitOpenError> {
        let word = self.state.load(Ordering::Acquire);
        match unpack(word) {
            (STATE_CLOSED, _) => Ok(CircuitPermit::new(self, false)),
            (STATE_OPEN, opened_at) => {
                let elapsed = Duration::from_nanos(self.now_nanos().saturating_sub(opened_at));
                if elapsed < self.break_duration {
                    return Err(self.rejection());
                }
                // Only the caller that moves Open -> HalfOpen gets the trial.
                match self.state.compare_exchange(
                    word,
                    pack(STATE_HALF_OPEN, opened_at),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        tracing::info!(route = %self.route, "Circuit half-open, allowing trial request");
                        set_circuit_state(&self.route, CircuitState::HalfOpen);
                        Ok(CircuitPermit::new(self, true))
                    }
                    Err(_) => Err(self.rejection()),
                }
            }
            _ => Err(self.rejection()),
        }
    }

    fn rejection(&self) -> CircuitOpenError {
        CircuitOpenError {
            route: self.route.clone(),
        }
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX >> 2)
    }

    /// Move out of half-open. Only the trial holder calls this.
    fn leave_half_open(&self, next: impl FnOnce(u64) -> u64) -> bool {
        let word = self.state.load(Ordering::Acquire);
        let (state, opened_at) = unpack(word);
        state == STATE_HALF_OPEN
            && self
                .state
                .compare_exchange(word, next(opened_at), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    fn on_success(&self, trial: bool) {
        self.consecutive_failures.store(0, Ordering::Release);
        if trial && self.leave_half_open(|_| pack(STATE_CLOSED, 0)) {
            tracing::info!(route = %self.route, "Circuit closed");
            set_circuit_state(&self.route, CircuitState::Closed);
        }
    }

    fn on_failure(&self, trial: bool) {
        if trial {
            let now = self.now_nanos();
            if self.leave_half_open(|_| pack(STATE_OPEN, now)) {
                tracing::warn!(
                    route = %self.route,
                    break_ms = self.break_duration.as_millis() as u64,
                    "Trial request failed, circuit re-opened"
                );
                set_circuit_state(&self.route, CircuitState::Open);
            }
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures < self.failure_threshold {
            return;
        }
        let word = self.state.load(Ordering::Acquire);
        if unpack(word).0 != STATE_CLOSED {
            // Late failure of a call admitted before the circuit opened.
            return;
        }
        // Several callers can cross the threshold together; one of them opens.
        if self
            .state
            .compare_exchange(
                word,
                pack(STATE_OPEN, self.now_nanos()),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            tracing::warn!(
                route = %self.route,
                failures,
                break_ms = self.break_duration.as_millis() as u64,
                "Circuit opened"
            );
            set_circuit_state(&self.route, CircuitState::Open);
        }
    }

    fn on_abandoned_trial(&self) {
        // Keep the original open timestamp so the next caller may trial at once.
        if self.leave_half_open(|opened_at| pack(STATE_OPEN, opened_at)) {
            tracing::debug!(route = %self.route, "Trial request abandoned, circuit back to open");
            set_circuit_state(&self.route, CircuitState::Open);
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("route", &self.route)
            .field("state", &self.state())
            .field("consecutive_failures", &self.consecutive_failures())
            .field("failure_threshold", &self.failure_threshold)
            .field("break_duration", &self.break_duration)
            .finish()
    }
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
#[must_use = "resolve the permit with succeed() or fail()"]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    resolved: bool,
}

impl<'a> CircuitPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            resolved: false,
        }
    }

    /// Whether this permit carries the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.trial);
    }

    pub fn fail(mut self) {
        self.resolved = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.trial {
            self.breaker.on_abandoned_trial();
        }
    }
}
