//! Circuit breaker to shed load from a failing store.
//!
//! When store calls fail repeatedly the circuit opens and subsequent calls
//! fail fast with [`BulwarkError::CircuitBreakerOpen`] instead of piling on.
//! State is evaluated lazily at admission time; there is no background timer.

use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use bulwark_core::{BulwarkError, CircuitBreakerConfig};

/// State of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Store considered down, calls are rejected
    Open,

    /// Probing whether the store recovered
    HalfOpen,
}

/// Point-in-time view of the breaker for health reports.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub since_last_failure: Option<Duration>,
    pub since_last_state_change: Duration,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure_time: Option<Instant>,
    last_state_change_time: Instant,
    /// Bumped on every transition; outcomes from older generations are stale.
    generation: u64,
    probe_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure_time: None,
            last_state_change_time: Instant::now(),
            generation: 0,
            probe_in_flight: false,
        }
    }
}

/// Circuit breaker guarding one logical resource.
///
/// Construct one per protected store and share it (`Arc`) between every
/// client of that store.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::new()),
            config,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `op` under the breaker.
    ///
    /// Rejected calls never invoke `op`. The breaker sits outside any retry
    /// loop, so one call counts as one outcome however many attempts it made.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T, BulwarkError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BulwarkError>>,
    {
        let mut permit = self.admit()?;
        let result = op().await;

        match &result {
            Ok(_) => self.record_success(&mut permit),
            Err(e) if e.trips_breaker() => self.record_failure(&mut permit),
            Err(_) => self.release(&mut permit),
        }

        result
    }

    /// Current state as last evaluated.
    ///
    /// An open circuit whose timeout has elapsed still reads `Open` until the
    /// next call is admitted.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Counters and timings.
    pub fn snapshot(&self) -> CircuitSnapshot {
        let s = self.state.lock();
        let now = Instant::now();
        CircuitSnapshot {
            state: s.state,
            failures: s.failures,
            successes: s.successes,
            since_last_failure: s.last_failure_time.map(|t| now.duration_since(t)),
            since_last_state_change: now.duration_since(s.last_state_change_time),
        }
    }

    /// Force the circuit closed (operator action).
    pub fn reset(&self) {
        let mut s = self.state.lock();
        self.transition(&mut s, CircuitState::Closed, Instant::now());
        s.last_failure_time = None;
        tracing::info!("Circuit manually reset to closed");
    }

    fn admit(&self) -> Result<Permit<'_>, BulwarkError> {
        let mut s = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(s.last_state_change_time);

        match s.state {
            CircuitState::Closed => Ok(Permit::new(self, s.generation, false)),
            CircuitState::Open => {
                if elapsed >= self.config.open_timeout {
                    self.transition(&mut s, CircuitState::HalfOpen, now);
                    s.probe_in_flight = true;
                    Ok(Permit::new(self, s.generation, true))
                } else {
                    Err(BulwarkError::CircuitBreakerOpen {
                        failures: s.failures,
                        retry_after: self.config.open_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if elapsed >= self.config.reset_timeout {
                    // A recovery test that never concluded counts as failed.
                    self.transition(&mut s, CircuitState::Open, now);
                    tracing::warn!(
                        reset_timeout = ?self.config.reset_timeout,
                        "Circuit reopened after stalled recovery test"
                    );
                    Err(BulwarkError::CircuitBreakerOpen {
                        failures: s.failures,
                        retry_after: self.config.open_timeout,
                    })
                } else if s.probe_in_flight {
                    Err(BulwarkError::CircuitBreakerOpen {
                        failures: s.failures,
                        retry_after: Duration::ZERO,
                    })
                } else {
                    s.probe_in_flight = true;
                    Ok(Permit::new(self, s.generation, true))
                }
            }
        }
    }

    fn record_success(&self, permit: &mut Permit<'_>) {
        permit.settled = true;
        let mut s = self.state.lock();
        if s.generation != permit.generation {
            return;
        }

        match s.state {
            CircuitState::Closed => s.failures = 0,
            CircuitState::HalfOpen => {
                s.probe_in_flight = false;
                s.successes += 1;
                if s.successes >= self.config.success_threshold {
                    self.transition(&mut s, CircuitState::Closed, Instant::now());
                    tracing::info!("Circuit closed after successful recovery");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, permit: &mut Permit<'_>) {
        permit.settled = true;
        let mut s = self.state.lock();
        let now = Instant::now();
        s.last_failure_time = Some(now);
        if s.generation != permit.generation {
            return;
        }

        match s.state {
            CircuitState::Closed => {
                s.failures += 1;
                if s.failures >= self.config.failure_threshold {
                    self.transition(&mut s, CircuitState::Open, now);
                    tracing::warn!(
                        failures = s.failures,
                        open_timeout = ?self.config.open_timeout,
                        "Circuit opened after repeated failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                s.failures += 1;
                self.transition(&mut s, CircuitState::Open, now);
                tracing::warn!("Circuit reopened after failed recovery attempt");
            }
            CircuitState::Open => {}
        }
    }

    /// Settle a permit without a verdict (the call said nothing about store
    /// health, or was cancelled).
    fn release(&self, permit: &mut Permit<'_>) {
        permit.settled = true;
        if !permit.probe {
            return;
        }
        let mut s = self.state.lock();
        if s.generation == permit.generation && s.state == CircuitState::HalfOpen {
            s.probe_in_flight = false;
        }
    }

    fn transition(&self, s: &mut BreakerState, to: CircuitState, now: Instant) {
        s.state = to;
        s.last_state_change_time = now;
        s.generation += 1;
        s.probe_in_flight = false;
        s.successes = 0;
        match to {
            CircuitState::Closed => s.failures = 0,
            CircuitState::HalfOpen => {
                tracing::info!("Circuit transitioning to half-open for recovery test");
            }
            CircuitState::Open => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

/// Admission ticket for one call. Dropping it unsettled (the caller's future
/// was cancelled) frees the half-open probe slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, generation: u64, probe: bool) -> Self {
        Self {
            breaker,
            generation,
            probe,
            settled: false,
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let breaker = self.breaker;
            breaker.release(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::{StoreError, ValidationError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(failure_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }

    async fn fail(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BulwarkError> {
        cb.execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(BulwarkError::from(StoreError::new("connection reset")))
        })
        .await
    }

    async fn succeed(cb: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BulwarkError> {
        cb.execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_and_sheds_load() {
        let cb = CircuitBreaker::new(config(3));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            assert!(fail(&cb, &calls).await.is_err());
        }
        assert_eq!(cb.state(), CircuitState::Open);

        // Rejected without invoking the operation
        for _ in 0..10 {
            let err = succeed(&cb, &calls).await.unwrap_err();
            assert!(err.is_circuit_open());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let cb = CircuitBreaker::new(config(3));
        let calls = AtomicU32::new(0);

        fail(&cb, &calls).await.unwrap_err();
        fail(&cb, &calls).await.unwrap_err();
        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.snapshot().failures, 0);

        fail(&cb, &calls).await.unwrap_err();
        fail(&cb, &calls).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_error_reports_retry_after() {
        let cb = CircuitBreaker::new(config(1));
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(20)).await;
        match succeed(&cb, &calls).await {
            Err(BulwarkError::CircuitBreakerOpen {
                failures,
                retry_after,
            }) => {
                assert_eq!(failures, 1);
                assert_eq!(retry_after, Duration::from_secs(40));
            }
            other => panic!("Expected CircuitBreakerOpen, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout_then_close() {
        let cb = CircuitBreaker::new(config(2));
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await.unwrap_err();
        fail(&cb, &calls).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(61)).await;

        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().successes, 1);

        succeed(&cb, &calls).await.unwrap();
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(config(2));
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await.unwrap_err();
        fail(&cb, &calls).await.unwrap_err();

        tokio::time::advance(Duration::from_secs(61)).await;
        succeed(&cb, &calls).await.unwrap();
        fail(&cb, &calls).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);

        // Full open timeout applies again from the reopen
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(succeed(&cb, &calls).await.unwrap_err().is_circuit_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_one_probe_at_a_time() {
        let cb = Arc::new(CircuitBreaker::new(config(1)));
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(61)).await;

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let probe_cb = cb.clone();
        let probe = tokio::spawn(async move {
            probe_cb
                .execute(|| async move {
                    rx.await.ok();
                    Ok::<_, BulwarkError>(())
                })
                .await
        });
        tokio::task::yield_now().await;

        // Second caller is shed while the probe is outstanding
        assert!(succeed(&cb, &calls).await.unwrap_err().is_circuit_open());

        tx.send(()).unwrap();
        probe.await.unwrap().unwrap();
        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_half_open_reopens() {
        let cb = CircuitBreaker::new(config(1));
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(61)).await;

        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(succeed(&cb, &calls).await.unwrap_err().is_circuit_open());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_frees_slot() {
        let cb = CircuitBreaker::new(config(1));
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await.unwrap_err();
        tokio::time::advance(Duration::from_secs(61)).await;

        let hung = cb.execute(|| async {
            std::future::pending::<()>().await;
            Ok::<_, BulwarkError>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_secs(1), hung).await;
        assert!(timed_out.is_err());

        succeed(&cb, &calls).await.unwrap();
        assert_eq!(cb.snapshot().successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_errors_do_not_count() {
        let cb = CircuitBreaker::new(config(1));
        for _ in 0..5 {
            let result: Result<(), BulwarkError> = cb
                .execute(|| async { Err(BulwarkError::from(ValidationError::EmptyQuery)) })
                .await;
            assert!(matches!(result, Err(BulwarkError::Validation(_))));
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_outcomes_are_ignored() {
        let cb = Arc::new(CircuitBreaker::new(config(1)));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        // A slow call admitted while closed...
        let slow_cb = cb.clone();
        let slow = tokio::spawn(async move {
            slow_cb
                .execute(|| async move {
                    rx.await.ok();
                    Err::<(), _>(BulwarkError::from(StoreError::new("connection reset")))
                })
                .await
        });
        tokio::task::yield_now().await;

        // ...while another call opens the circuit and an operator resets it.
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await.unwrap_err();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();

        tx.send(()).unwrap();
        slow.await.unwrap().unwrap_err();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let cb = CircuitBreaker::new(config(1));
        let calls = AtomicU32::new(0);
        fail(&cb, &calls).await.unwrap_err();

        cb.reset();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failures, 0);
        succeed(&cb, &calls).await.unwrap();
    }
}
