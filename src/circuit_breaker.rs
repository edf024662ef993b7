//! Three-state circuit breaker (§4.3): closed / open / half-open.
//!
//! The server runs three independent instances — browser, network, tool —
//! each guarding a different subsystem (§2). A call acquires the breaker's
//! lock twice: once to gate (`try_acquire`), once to record the outcome.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown: Duration,
    pub half_open_max_inflight: u32,
}

impl BreakerConfig {
    #[must_use]
    pub fn browser() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            cooldown: Duration::from_secs(60),
            half_open_max_inflight: 3,
        }
    }

    #[must_use]
    pub fn network() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(30),
            half_open_max_inflight: 3,
        }
    }

    #[must_use]
    pub fn tool() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(30),
            half_open_max_inflight: 3,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<std::time::Instant>,
}

impl Default for CircuitState {
    fn default() -> Self {
        CircuitState::Closed
    }
}

/// A single named circuit breaker instance.
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<Inner>,
    half_open_inflight: AtomicU32,
    total_trips: AtomicU64,
}

/// Returned by `try_acquire`; caller must call `record_success`/`record_failure`
/// exactly once, or drop the permit to release the half-open inflight slot
/// without affecting counters (used when the caller bails before invoking the
/// guarded body).
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    is_half_open: bool,
    consumed: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.is_half_open && !self.consumed {
            self.breaker.half_open_inflight.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner::default()),
            half_open_inflight: AtomicU32::new(0),
            total_trips: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.maybe_transition_to_half_open(&mut inner);
        inner.state
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= self.config.cooldown
        {
            info!(target: "circuit_breaker", name = self.name, "cooldown elapsed, transitioning to half-open");
            inner.state = CircuitState::HalfOpen;
            inner.consecutive_successes = 0;
        }
    }

    /// Gate a call. Returns `None` if the breaker rejects it (open, or
    /// half-open with no inflight slots available).
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock();
        self.maybe_transition_to_half_open(&mut inner);

        match inner.state {
            CircuitState::Closed => Some(Permit {
                breaker: self,
                is_half_open: false,
                consumed: false,
            }),
            CircuitState::Open => None,
            CircuitState::HalfOpen => {
                let current = self.half_open_inflight.fetch_add(1, Ordering::SeqCst);
                if current >= self.config.half_open_max_inflight {
                    self.half_open_inflight.fetch_sub(1, Ordering::SeqCst);
                    None
                } else {
                    Some(Permit {
                        breaker: self,
                        is_half_open: true,
                        consumed: false,
                    })
                }
            }
        }
    }

    pub fn record_success(&self, mut permit: Permit<'_>) {
        permit.consumed = true;
        if permit.is_half_open {
            self.half_open_inflight.fetch_sub(1, Ordering::SeqCst);
        }
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    info!(target: "circuit_breaker", name = self.name, "recovered, closing circuit");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, mut permit: Permit<'_>) {
        permit.consumed = true;
        if permit.is_half_open {
            self.half_open_inflight.fetch_sub(1, Ordering::SeqCst);
        }
        let mut inner = self.inner.lock();
        inner.consecutive_successes = 0;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.trip(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                self.trip(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, inner: &mut Inner) {
        warn!(target: "circuit_breaker", name = self.name, "tripping open");
        inner.state = CircuitState::Open;
        inner.opened_at = Some(std::time::Instant::now());
        inner.consecutive_failures = 0;
        self.total_trips.fetch_add(1, Ordering::Relaxed);
    }

    /// Force the breaker closed, e.g. after a successful browser restart
    /// (§4.6 "reset the browser circuit breaker").
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
        self.half_open_inflight.store(0, Ordering::SeqCst);
    }

    #[must_use]
    pub fn total_trips(&self) -> u64 {
        self.total_trips.load(Ordering::Relaxed)
    }
}

/// Bundles the three named breakers the server runs (§2).
pub struct CircuitBreakers {
    pub browser: CircuitBreaker,
    pub network: CircuitBreaker,
    pub tool: CircuitBreaker,
}

impl Default for CircuitBreakers {
    fn default() -> Self {
        Self {
            browser: CircuitBreaker::new("browser", BreakerConfig::browser()),
            network: CircuitBreaker::new("network", BreakerConfig::network()),
            tool: CircuitBreaker::new("tool", BreakerConfig::tool()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 2,
            success_threshold: 2,
            cooldown: Duration::from_millis(20),
            half_open_max_inflight: 1,
        }
    }

    #[test]
    fn closed_allows_calls() {
        let cb = CircuitBreaker::new("t", fast_config());
        assert!(cb.try_acquire().is_some());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn trips_open_after_threshold_failures() {
        let cb = CircuitBreaker::new("t", fast_config());
        for _ in 0..2 {
            let p = cb.try_acquire().unwrap();
            cb.record_failure(p);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_none());
    }

    #[test]
    fn half_open_after_cooldown_then_closes_on_successes() {
        let cb = CircuitBreaker::new("t", fast_config());
        for _ in 0..2 {
            let p = cb.try_acquire().unwrap();
            cb.record_failure(p);
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let p1 = cb.try_acquire().expect("one half-open slot");
        cb.record_success(p1);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let p2 = cb.try_acquire().expect("second half-open slot");
        cb.record_success(p2);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("t", fast_config());
        for _ in 0..2 {
            let p = cb.try_acquire().unwrap();
            cb.record_failure(p);
        }
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let p = cb.try_acquire().unwrap();
        cb.record_failure(p);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_rejects_beyond_inflight_cap() {
        let cb = CircuitBreaker::new("t", fast_config()); // cap = 1
        for _ in 0..2 {
            let p = cb.try_acquire().unwrap();
            cb.record_failure(p);
        }
        std::thread::sleep(Duration::from_millis(30));
        let _held = cb.try_acquire().expect("first slot granted");
        assert!(cb.try_acquire().is_none(), "second concurrent half-open call must be rejected");
    }

    #[test]
    fn reset_forces_closed() {
        let cb = CircuitBreaker::new("t", fast_config());
        for _ in 0..2 {
            let p = cb.try_acquire().unwrap();
            cb.record_failure(p);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
