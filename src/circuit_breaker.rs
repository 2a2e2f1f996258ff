//! Circuit breaker guarding a client's upstream service.
//!
//! # States
//!
//! ```text
//! Closed    -> Open:      rolling volume >= request_volume_threshold
//!                         and error % >= error_percent_threshold
//! Open      -> Half-Open: sleep_window elapsed, one trial call admitted
//! Half-Open -> Closed:    trial call succeeded (rolling counts reset)
//! Half-Open -> Open:      trial call failed (sleep window restarts)
//! ```
//!
//! Independently of the state machine, the breaker caps the number of calls
//! in flight. Calls over the cap are refused immediately.
//!
//! Each [`Client`](crate::Client) owns its breaker. Clones of a client share
//! it; separately constructed clients never do.

use crate::{Error, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// In-flight cap as a multiple of `max_conns_per_host`.
///
/// The cap is `BREAKER_CONCURRENCY_FACTOR * max_conns_per_host` unless
/// [`CircuitBreakerConfig::max_concurrent_requests`] sets it explicitly.
pub const BREAKER_CONCURRENCY_FACTOR: usize = 2;

/// In-flight cap used when neither `max_conns_per_host` nor
/// `max_concurrent_requests` is set.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

const BUCKETS_PER_WINDOW: u32 = 10;

/// Breaker settings.
///
/// # Examples
///
/// ```
/// use breakwater::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::enabled()
///     .error_percent_threshold(50)
///     .request_volume_threshold(10)
///     .sleep_window(Duration::from_secs(5));
///
/// assert_eq!(config.concurrency_cap(8), 16);
/// assert_eq!(config.clone().max_concurrent_requests(3).concurrency_cap(8), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When `false` the client calls the transport directly.
    pub enabled: bool,

    /// Error percentage (0-100) at or above which the breaker opens.
    pub error_percent_threshold: u8,

    /// Calls needed inside the rolling window before the error rate counts.
    pub request_volume_threshold: u32,

    /// Time spent open before a trial call is let through.
    #[serde(rename = "sleep_window_ms", deserialize_with = "crate::config::millis::deserialize")]
    pub sleep_window: Duration,

    /// Bound on the measured section of a call. Expiry counts as a failure.
    /// `None` leaves only the client timeout in effect.
    #[serde(rename = "timeout_ms", deserialize_with = "crate::config::millis::deserialize_option")]
    pub timeout: Option<Duration>,

    /// Explicit in-flight cap, overriding the derived one.
    pub max_concurrent_requests: Option<usize>,

    /// Span of the rolling error-rate window.
    #[serde(rename = "rolling_window_ms", deserialize_with = "crate::config::millis::deserialize")]
    pub rolling_window: Duration,

    /// Count 5xx responses as failures. Otherwise only transport errors and
    /// timeouts do.
    pub count_server_errors: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            error_percent_threshold: 50,
            request_volume_threshold: 20,
            sleep_window: Duration::from_secs(5),
            timeout: None,
            max_concurrent_requests: None,
            rolling_window: Duration::from_secs(10),
            count_server_errors: false,
        }
    }
}

impl CircuitBreakerConfig {
    /// Default settings with the breaker switched on.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    /// Sets the error percentage that opens the breaker.
    pub fn error_percent_threshold(mut self, percent: u8) -> Self {
        self.error_percent_threshold = percent;
        self
    }

    /// Sets the rolling volume needed before the error rate is evaluated.
    pub fn request_volume_threshold(mut self, volume: u32) -> Self {
        self.request_volume_threshold = volume;
        self
    }

    /// Sets how long the breaker stays open before a trial call.
    pub fn sleep_window(mut self, window: Duration) -> Self {
        self.sleep_window = window;
        self
    }

    /// Sets the bound on the measured section of a call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the in-flight cap explicitly.
    pub fn max_concurrent_requests(mut self, limit: usize) -> Self {
        self.max_concurrent_requests = Some(limit);
        self
    }

    /// Sets the span of the rolling window.
    pub fn rolling_window(mut self, window: Duration) -> Self {
        self.rolling_window = window;
        self
    }

    /// Counts 5xx responses as failures.
    pub fn count_server_errors(mut self, count: bool) -> Self {
        self.count_server_errors = count;
        self
    }

    /// The in-flight cap for a client allowing `max_conns_per_host`
    /// connections.
    pub fn concurrency_cap(&self, max_conns_per_host: usize) -> usize {
        match self.max_concurrent_requests {
            Some(limit) => limit,
            None if max_conns_per_host > 0 => {
                max_conns_per_host.saturating_mul(BREAKER_CONCURRENCY_FACTOR)
            }
            None => DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.error_percent_threshold > 100 {
            return Err(Error::ConfigurationError(format!(
                "error_percent_threshold must be within 0..=100, got {}",
                self.error_percent_threshold
            )));
        }
        if self.max_concurrent_requests == Some(0) {
            return Err(Error::ConfigurationError(
                "max_concurrent_requests must be >= 1".to_string(),
            ));
        }
        if self.rolling_window.is_zero() {
            return Err(Error::ConfigurationError(
                "rolling_window must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through and are measured.
    Closed,
    /// Calls are refused without reaching the transport.
    Open,
    /// A single trial call is in flight.
    HalfOpen,
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Outcomes recorded in the rolling window
    pub requests: u64,
    /// Failures recorded in the rolling window
    pub failures: u64,
    /// Calls currently holding an admission
    pub in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    Measured,
    Trial,
}

#[derive(Debug)]
enum State {
    Closed,
    Open { opened_at: Instant },
    HalfOpen,
}

#[derive(Debug)]
struct Bucket {
    started_at: Instant,
    successes: u64,
    failures: u64,
}

#[derive(Debug)]
struct RollingWindow {
    span: Duration,
    bucket_width: Duration,
    buckets: VecDeque<Bucket>,
}

impl RollingWindow {
    fn new(span: Duration) -> Self {
        let bucket_width = (span / BUCKETS_PER_WINDOW).max(Duration::from_millis(1));
        Self {
            span,
            bucket_width,
            buckets: VecDeque::with_capacity(BUCKETS_PER_WINDOW as usize + 1),
        }
    }

    fn record(&mut self, now: Instant, success: bool) {
        self.expire(now);

        let fits_last = self
            .buckets
            .back()
            .is_some_and(|b| now.saturating_duration_since(b.started_at) < self.bucket_width);
        if !fits_last {
            self.buckets.push_back(Bucket {
                started_at: now,
                successes: 0,
                failures: 0,
            });
        }

        if let Some(bucket) = self.buckets.back_mut() {
            if success {
                bucket.successes += 1;
            } else {
                bucket.failures += 1;
            }
        }
    }

    /// Returns `(requests, failures)` inside the window.
    fn totals(&mut self, now: Instant) -> (u64, u64) {
        self.expire(now);
        self.buckets.iter().fold((0, 0), |(requests, failures), b| {
            (requests + b.successes + b.failures, failures + b.failures)
        })
    }

    fn expire(&mut self, now: Instant) {
        while self
            .buckets
            .front()
            .is_some_and(|b| now.saturating_duration_since(b.started_at) >= self.span)
        {
            self.buckets.pop_front();
        }
    }

    fn reset(&mut self) {
        self.buckets.clear();
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    window: RollingWindow,
}

/// Named admission-control state machine for one client.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    max_concurrent: usize,
    inner: Mutex<Inner>,
    permits: Arc<Semaphore>,
}

impl CircuitBreaker {
    /// Creates a closed breaker allowing `max_concurrent` calls in flight.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            name: name.into(),
            inner: Mutex::new(Inner {
                state: State::Closed,
                window: RollingWindow::new(config.rolling_window),
            }),
            config,
            max_concurrent,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// The breaker's name, stable for its lifetime.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker's settings.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// The current state.
    ///
    /// An open breaker whose sleep window has elapsed still reports
    /// [`CircuitState::Open`] until the next call is admitted as a trial.
    pub fn state(&self) -> CircuitState {
        match self.inner.lock().state {
            State::Closed => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen => CircuitState::HalfOpen,
        }
    }

    /// A consistent view of state, rolling counts and in-flight calls.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.inner.lock();
        let (requests, failures) = inner.window.totals(Instant::now());
        let state = match inner.state {
            State::Closed => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen => CircuitState::HalfOpen,
        };
        BreakerSnapshot {
            state,
            requests,
            failures,
            in_flight: self.max_concurrent - self.permits.available_permits(),
        }
    }

    /// Asks to run one call.
    ///
    /// The returned [`Admission`] must be resolved with
    /// [`Admission::success`] or [`Admission::failure`]. Dropping it
    /// unresolved, e.g. when the caller's future is cancelled, records a
    /// failure.
    ///
    /// # Errors
    ///
    /// [`Error::CircuitOpen`] while open (or while a trial is in flight), and
    /// [`Error::ConcurrencyLimitExceeded`] when the in-flight cap is reached.
    pub fn admit(self: &Arc<Self>) -> Result<Admission> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let kind = match inner.state {
            State::Closed => AttemptKind::Measured,
            State::Open { opened_at }
                if now.saturating_duration_since(opened_at) >= self.config.sleep_window =>
            {
                AttemptKind::Trial
            }
            State::Open { .. } | State::HalfOpen => {
                return Err(Error::CircuitOpen {
                    name: self.name.clone(),
                })
            }
        };

        let permit = Arc::clone(&self.permits).try_acquire_owned().map_err(|_| {
            Error::ConcurrencyLimitExceeded {
                name: self.name.clone(),
                limit: self.max_concurrent,
            }
        })?;

        if kind == AttemptKind::Trial {
            tracing::debug!(breaker = %self.name, "Circuit breaker half-open, admitting trial call");
            inner.state = State::HalfOpen;
        }

        Ok(Admission {
            breaker: Arc::clone(self),
            kind,
            resolved: false,
            _permit: permit,
        })
    }

    fn record(&self, kind: AttemptKind, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        if kind == AttemptKind::Trial {
            if success {
                tracing::info!(breaker = %self.name, "Circuit breaker closing");
                inner.state = State::Closed;
                inner.window.reset();
            } else {
                tracing::warn!(breaker = %self.name, "Trial call failed, circuit breaker reopening");
                inner.state = State::Open { opened_at: now };
            }
            return;
        }

        inner.window.record(now, success);
        if !matches!(inner.state, State::Closed) {
            return;
        }

        let (requests, failures) = inner.window.totals(now);
        if self.should_trip(requests, failures) {
            tracing::warn!(
                breaker = %self.name,
                requests = requests,
                failures = failures,
                error_percent = failures * 100 / requests,
                "Circuit breaker opening"
            );
            inner.state = State::Open { opened_at: now };
        }
    }

    fn should_trip(&self, requests: u64, failures: u64) -> bool {
        requests > 0
            && failures > 0
            && requests >= u64::from(self.config.request_volume_threshold)
            && failures * 100 >= u64::from(self.config.error_percent_threshold) * requests
    }
}

/// Permission to run one call, holding an in-flight slot until resolved.
#[derive(Debug)]
pub struct Admission {
    breaker: Arc<CircuitBreaker>,
    kind: AttemptKind,
    resolved: bool,
    _permit: OwnedSemaphorePermit,
}

impl Admission {
    /// Records a successful call.
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.record(self.kind, true);
    }

    /// Records a failed call.
    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.record(self.kind, false);
    }

    /// Returns `true` if this call is the half-open trial.
    pub fn is_trial(&self) -> bool {
        self.kind == AttemptKind::Trial
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if !self.resolved {
            self.breaker.record(self.kind, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(config: CircuitBreakerConfig, max_concurrent: usize) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("test", config, max_concurrent))
    }

    fn tripping_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::enabled()
            .error_percent_threshold(50)
            .request_volume_threshold(10)
            .sleep_window(Duration::from_secs(5))
    }

    fn run(cb: &Arc<CircuitBreaker>, success: bool) {
        let admission = cb.admit().unwrap();
        if success {
            admission.success();
        } else {
            admission.failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_volume_and_error_rate() {
        let cb = breaker(tripping_config(), 10);

        for _ in 0..5 {
            run(&cb, false);
        }
        for _ in 0..4 {
            run(&cb, true);
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        run(&cb, true);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.admit(), Err(Error::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_error_rate() {
        let cb = breaker(tripping_config(), 10);

        for _ in 0..4 {
            run(&cb, false);
        }
        for _ in 0..16 {
            run(&cb, true);
        }

        assert_eq!(cb.state(), CircuitState::Closed);
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.requests, 20);
        assert_eq!(snapshot.failures, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_volume() {
        let cb = breaker(tripping_config(), 10);

        for _ in 0..9 {
            run(&cb, false);
        }

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.admit().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_outcomes_leave_the_window() {
        let config = tripping_config().rolling_window(Duration::from_secs(10));
        let cb = breaker(config, 10);

        for _ in 0..9 {
            run(&cb, false);
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        run(&cb, false);

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial_and_closes_on_success() {
        let cb = breaker(tripping_config(), 10);
        for _ in 0..10 {
            run(&cb, false);
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(matches!(cb.admit(), Err(Error::CircuitOpen { .. })));

        tokio::time::advance(Duration::from_secs(1)).await;
        let trial = cb.admit().unwrap();
        assert!(trial.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(matches!(cb.admit(), Err(Error::CircuitOpen { .. })));

        trial.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().requests, 0);

        let next = cb.admit().unwrap();
        assert!(!next.is_trial());
        next.success();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_and_restarts_window() {
        let cb = breaker(tripping_config(), 10);
        for _ in 0..10 {
            run(&cb, false);
        }

        tokio::time::advance(Duration::from_secs(5)).await;
        cb.admit().unwrap().failure();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(matches!(cb.admit(), Err(Error::CircuitOpen { .. })));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cb.admit().unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_counts_as_failure() {
        let cb = breaker(tripping_config(), 10);
        for _ in 0..10 {
            run(&cb, false);
        }

        tokio::time::advance(Duration::from_secs(5)).await;
        drop(cb.admit().unwrap());

        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_concurrency_cap_rejects_immediately() {
        let cb = breaker(CircuitBreakerConfig::enabled(), 2);

        let first = cb.admit().unwrap();
        let second = cb.admit().unwrap();
        match cb.admit() {
            Err(Error::ConcurrencyLimitExceeded { limit, .. }) => assert_eq!(limit, 2),
            other => panic!("Expected ConcurrencyLimitExceeded, got {:?}", other),
        }
        assert_eq!(cb.snapshot().in_flight, 2);

        first.success();
        assert!(cb.admit().is_ok());
        second.success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_outcomes_are_not_lost() {
        let config = CircuitBreakerConfig::enabled()
            .request_volume_threshold(u32::MAX)
            .rolling_window(Duration::from_secs(600));
        let cb = breaker(config, 1000);

        let tasks: Vec<_> = (0..400)
            .map(|i| {
                let cb = Arc::clone(&cb);
                tokio::spawn(async move {
                    let admission = cb.admit().unwrap();
                    tokio::task::yield_now().await;
                    if i % 4 == 0 {
                        admission.failure();
                    } else {
                        admission.success();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.requests, 400);
        assert_eq!(snapshot.failures, 100);
        assert_eq!(snapshot.in_flight, 0);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[test]
    fn test_concurrency_cap_derivation() {
        let config = CircuitBreakerConfig::enabled();
        assert_eq!(config.concurrency_cap(0), DEFAULT_MAX_CONCURRENT_REQUESTS);
        assert_eq!(config.concurrency_cap(5), 10);
        assert_eq!(config.max_concurrent_requests(7).concurrency_cap(5), 7);
    }

    #[test]
    fn test_validate() {
        assert!(CircuitBreakerConfig::enabled().validate().is_ok());
        assert!(CircuitBreakerConfig::enabled()
            .error_percent_threshold(101)
            .validate()
            .is_err());
        assert!(CircuitBreakerConfig::enabled()
            .max_concurrent_requests(0)
            .validate()
            .is_err());
        assert!(CircuitBreakerConfig::default()
            .error_percent_threshold(101)
            .validate()
            .is_ok());
    }
}
