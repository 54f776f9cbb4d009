use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Runtime circuit state for upstream rate provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed calls (after retries) before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial is admitted.
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    /// Bumped on every state transition; outcomes from an older epoch are stale.
    epoch: u64,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            epoch: 0,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

impl CircuitInner {
    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.epoch = self.epoch.wrapping_add(1);
        self.trial_in_flight = false;
        self.opened_at = (state == CircuitState::Open).then(Instant::now);
        if state == CircuitState::Closed {
            self.consecutive_failures = 0;
        }
    }
}

/// Admission handed out by [`CircuitBreaker::allow_request`].
///
/// The outcome of the admitted call is reported back with this permit. It is
/// only applied if the circuit has not changed state since admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct CircuitPermit {
    epoch: u64,
    trial: bool,
}

impl CircuitPermit {
    /// True when this admission is the single half-open trial.
    pub const fn is_trial(self) -> bool {
        self.trial
    }
}

/// Thread-safe circuit breaker shared by every call to one upstream target.
///
/// All transitions happen under one lock, so a caller can never be admitted
/// while another observes the circuit as open. In the half-open state exactly
/// one trial is admitted; concurrent callers fail fast until it reports back.
/// Calls admitted before a transition report stale outcomes, which are
/// ignored: a slow success from before the circuit opened cannot close it.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub const fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Admit a call, or `None` when the caller must fail fast.
    pub fn allow_request(&self) -> Option<CircuitPermit> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(CircuitPermit {
                epoch: inner.epoch,
                trial: false,
            }),
            CircuitState::HalfOpen if inner.trial_in_flight => None,
            CircuitState::HalfOpen => {
                inner.trial_in_flight = true;
                Some(CircuitPermit {
                    epoch: inner.epoch,
                    trial: true,
                })
            }
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|opened_at| opened_at.elapsed() >= self.config.open_timeout);
                if !cooled_down {
                    return None;
                }

                inner.transition(CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                Some(CircuitPermit {
                    epoch: inner.epoch,
                    trial: true,
                })
            }
        }
    }

    pub fn record_success(&self, permit: CircuitPermit) {
        let mut inner = self.lock();
        if inner.epoch != permit.epoch {
            return;
        }
        match inner.state {
            CircuitState::HalfOpen if permit.trial => inner.transition(CircuitState::Closed),
            CircuitState::Closed => inner.consecutive_failures = 0,
            _ => {}
        }
    }

    pub fn record_failure(&self, permit: CircuitPermit) {
        let mut inner = self.lock();
        if inner.epoch != permit.epoch {
            return;
        }
        match inner.state {
            CircuitState::HalfOpen if permit.trial => inner.transition(CircuitState::Open),
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.transition(CircuitState::Open);
                }
            }
            _ => {}
        }
    }

    /// Gives back an admission whose call was cancelled before reporting an
    /// outcome, so a half-open circuit can admit the next trial.
    pub fn abandon(&self, permit: CircuitPermit) {
        let mut inner = self.lock();
        if permit.trial && inner.epoch == permit.epoch {
            inner.trial_in_flight = false;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        // The guarded state is plain data; a panic mid-update cannot leave it torn.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
