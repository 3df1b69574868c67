// =============================================================================
// circuit_breaker.rs — THE DEAD AIR DETECTOR
// =============================================================================
//
// Station websites go down. Sometimes for a minute, sometimes for the
// whole weekend because the intern who ran the "now playing" widget left.
// There is no point asking a dead endpoint every refresh tick.
//
// Closed   — requests flow, consecutive failures are counted
// Open     — N consecutive failures: no requests until the cooldown passes
// HalfOpen — cooldown passed: requests allowed again; M successes close the
//            circuit, one failure opens it again
//
// This is not a retry mechanism. A skipped crawl is simply a crawl that
// reports CircuitOpen and gets skipped like any other failed crawl.
// =============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

/// Where a breaker currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Thresholds for a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit blocks requests.
    pub reset_timeout: Duration,
    /// Successes in half-open state before the circuit closes.
    pub success_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
    trips: u64,
}

/// A thread-safe circuit breaker guarding one station.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
                trips: 0,
            }),
        }
    }

    /// Whether a request may go out right now. An open circuit whose
    /// cooldown has passed moves to half-open and lets the request through.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.settings.reset_timeout);
                if cooled_down {
                    info!(station = %self.name, "Circuit breaker OPEN -> HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                }
                cooled_down
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.settings.success_threshold {
                    info!(station = %self.name, "Circuit breaker HALF_OPEN -> CLOSED");
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                    inner.successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.settings.failure_threshold {
                    warn!(
                        station = %self.name,
                        failures = inner.failures,
                        cooldown_secs = self.settings.reset_timeout.as_secs(),
                        "Circuit breaker TRIPPED — CLOSED -> OPEN"
                    );
                    Self::open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                warn!(station = %self.name, "Probe failed in HALF_OPEN — back to OPEN");
                Self::open(&mut inner);
            }
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
        }
    }

    fn open(inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.successes = 0;
        inner.trips += 1;
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn trips(&self) -> u64 {
        self.inner.lock().trips
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
