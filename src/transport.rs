//! Rate-limited access to the upstream.
//!
//! [`RateLimitedTransport`] wraps every upstream call with two bounded retry
//! loops, both driven by a [`RetryPolicy`]:
//!
//! - **Throttling**: upstream says "retry after N seconds". Wait N seconds
//!   plus the policy padding, then re-issue the *same* request. Give up with
//!   [`PostpackError::RateLimited`] after `max_throttle_retries`, or at once if
//!   N exceeds `max_throttle_wait_secs`.
//! - **Transient failures**: timeouts, resets and 5xx answers back off
//!   exponentially, then fail with [`PostpackError::Network`] after
//!   `max_transient_retries`.
//!
//! Everything else is terminal and handed back untouched as
//! [`TransportError::Terminal`] for the caller to interpret.
//!
//! Waiting goes through the [`Sleeper`] trait so tests can use
//! [`RecordingSleeper`] instead of a real clock.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::CancelHandle;
use crate::error::PostpackError;
use crate::upstream::{Upstream, UpstreamError};

/// Bounds for throttling and transient-failure retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Throttled retries per logical call (default: 5)
    pub max_throttle_retries: u32,
    /// Transient-failure retries per logical call (default: 3)
    pub max_transient_retries: u32,
    /// First backoff delay (default: 500ms)
    pub initial_delay_ms: u64,
    /// Backoff ceiling (default: 8s)
    pub max_delay_ms: u64,
    /// Backoff growth factor (default: 2.0)
    pub backoff_multiplier: f64,
    /// Added to every upstream retry-after (default: 250ms)
    pub throttle_padding_ms: u64,
    /// Longest retry-after we agree to wait (default: 300s)
    pub max_throttle_wait_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_throttle_retries: 5,
            max_transient_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
            throttle_padding_ms: 250,
            max_throttle_wait_secs: 300,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_throttle_retries: 0,
            max_transient_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_throttle_retries(mut self, retries: u32) -> Self {
        self.max_throttle_retries = retries;
        self
    }

    #[must_use]
    pub fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.max_transient_retries = retries;
        self
    }

    #[must_use]
    pub fn with_throttle_padding(mut self, padding: Duration) -> Self {
        self.throttle_padding_ms = padding.as_millis() as u64;
        self
    }

    /// Backoff before transient retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = self
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = (self.initial_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Wait before re-issuing a throttled request, or `None` when upstream
    /// asks for longer than we are willing to wait.
    pub fn throttle_delay(&self, retry_after: Duration) -> Option<Duration> {
        if retry_after > Duration::from_secs(self.max_throttle_wait_secs) {
            return None;
        }
        Some(retry_after + Duration::from_millis(self.throttle_padding_ms))
    }
}

/// Suspends the current task.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fake clock: records requested waits and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits requested so far, in order.
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Sum of all requested waits.
    pub fn total(&self) -> Duration {
        self.waits().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(duration);
        }
    }
}

/// Why a transported call failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A non-retryable upstream outcome, passed through untouched.
    #[error(transparent)]
    Terminal(UpstreamError),

    /// Retries exhausted, or cancelled while waiting.
    #[error(transparent)]
    Failed(PostpackError),
}

impl TransportError {
    /// Converts to a [`PostpackError`], treating terminal upstream outcomes
    /// as network failures of `operation`.
    pub fn into_network(self, operation: &'static str) -> PostpackError {
        match self {
            TransportError::Failed(err) => err,
            TransportError::Terminal(err) => PostpackError::network(operation, err.to_string()),
        }
    }
}

/// Upstream access with bounded throttling and backoff.
pub struct RateLimitedTransport {
    upstream: Arc<dyn Upstream>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancelHandle,
    throttle_waits: AtomicU32,
    transient_retries: AtomicU32,
}

impl RateLimitedTransport {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            upstream,
            policy,
            sleeper,
            cancel,
            throttle_waits: AtomicU32::new(0),
            transient_retries: AtomicU32::new(0),
        }
    }

    /// The wrapped upstream, for building call closures.
    pub fn upstream(&self) -> &dyn Upstream {
        self.upstream.as_ref()
    }

    pub fn cancel_handle(&self) -> &CancelHandle {
        &self.cancel
    }

    /// Throttle pauses taken so far.
    pub fn throttle_waits(&self) -> u32 {
        self.throttle_waits.load(Ordering::Relaxed)
    }

    /// Transient retries taken so far.
    pub fn transient_retries(&self) -> u32 {
        self.transient_retries.load(Ordering::Relaxed)
    }

    /// Runs `op` until it succeeds, fails terminally, or a bound is hit.
    ///
    /// `op` is invoked again for every retry and must issue the identical
    /// request each time.
    pub async fn call<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, UpstreamError>> + Send,
        T: Send,
    {
        let mut attempts: u32 = 0;
        let mut throttled: u32 = 0;
        let mut transient: u32 = 0;

        loop {
            self.cancel.check().map_err(TransportError::Failed)?;
            attempts += 1;

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let wait = match err {
                UpstreamError::Throttled { retry_after } => {
                    throttled += 1;
                    let delay = self.policy.throttle_delay(retry_after);
                    match delay {
                        Some(delay) if throttled <= self.policy.max_throttle_retries => {
                            warn!(
                                operation,
                                retry_after_secs = retry_after.as_secs(),
                                attempt = attempts,
                                "throttled by upstream, waiting"
                            );
                            self.throttle_waits.fetch_add(1, Ordering::Relaxed);
                            delay
                        }
                        _ => {
                            return Err(TransportError::Failed(PostpackError::RateLimited {
                                operation,
                                attempts,
                                retry_after,
                            }));
                        }
                    }
                }
                UpstreamError::Transient(message) => {
                    transient += 1;
                    if transient > self.policy.max_transient_retries {
                        return Err(TransportError::Failed(PostpackError::network(
                            operation, message,
                        )));
                    }
                    let delay = self.policy.backoff_delay(transient);
                    debug!(
                        operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "transient upstream failure, backing off"
                    );
                    self.transient_retries.fetch_add(1, Ordering::Relaxed);
                    delay
                }
                terminal => return Err(TransportError::Terminal(terminal)),
            };

            tokio::select! {
                () = self.sleeper.sleep(wait) => {}
                () = self.cancel.cancelled() => {
                    return Err(TransportError::Failed(PostpackError::Cancelled));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::FixtureUpstream;
    use std::sync::atomic::AtomicUsize;

    fn transport(policy: RetryPolicy, sleeper: Arc<RecordingSleeper>) -> RateLimitedTransport {
        RateLimitedTransport::new(
            Arc::new(FixtureUpstream::new()),
            policy,
            sleeper,
            CancelHandle::new(),
        )
    }

    /// Fails with the scripted errors in order, then succeeds.
    async fn scripted(
        calls: &AtomicUsize,
        script: &[UpstreamError],
    ) -> Result<&'static str, UpstreamError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        match script.get(n) {
            Some(err) => Err(err.clone()),
            None => Ok("ok"),
        }
    }

    fn throttle(secs: u64) -> UpstreamError {
        UpstreamError::Throttled {
            retry_after: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_backoff_progression() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(8000));
    }

    #[test]
    fn test_throttle_delay_bounds() {
        let policy = RetryPolicy::default().with_throttle_padding(Duration::ZERO);
        assert_eq!(
            policy.throttle_delay(Duration::from_secs(3)),
            Some(Duration::from_secs(3))
        );
        assert_eq!(policy.throttle_delay(Duration::from_secs(301)), None);
    }

    #[tokio::test]
    async fn test_throttle_waits_then_succeeds() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let policy = RetryPolicy::default().with_throttle_padding(Duration::from_millis(100));
        let t = transport(policy, sleeper.clone());
        let calls = AtomicUsize::new(0);
        let script = [throttle(3)];

        let result = t.call("test", || scripted(&calls, &script)).await.unwrap();

        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.waits(), vec![Duration::from_millis(3100)]);
        assert_eq!(t.throttle_waits(), 1);
    }

    #[tokio::test]
    async fn test_throttle_cap_surfaces_rate_limited() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let t = transport(RetryPolicy::default().with_max_throttle_retries(2), sleeper.clone());
        let calls = AtomicUsize::new(0);
        let script = [throttle(1), throttle(1), throttle(2)];

        let err = t.call("test", || scripted(&calls, &script)).await.unwrap_err();

        match err {
            TransportError::Failed(PostpackError::RateLimited {
                attempts,
                retry_after,
                ..
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(retry_after, Duration::from_secs(2));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sleeper.waits().len(), 2);
    }

    #[tokio::test]
    async fn test_excessive_retry_after_is_not_waited() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let t = transport(RetryPolicy::default(), sleeper.clone());
        let calls = AtomicUsize::new(0);
        let script = [throttle(3_600)];

        let err = t.call("test", || scripted(&calls, &script)).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Failed(PostpackError::RateLimited { .. })
        ));
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_transient_backoff_then_network_error() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let t = transport(RetryPolicy::default().with_max_transient_retries(2), sleeper.clone());
        let calls = AtomicUsize::new(0);
        let reset = UpstreamError::Transient("connection reset".into());
        let script = [reset.clone(), reset.clone(), reset];

        let err = t.call("fetch_history", || scripted(&calls, &script)).await.unwrap_err();

        assert!(matches!(
            err,
            TransportError::Failed(PostpackError::Network { operation: "fetch_history", .. })
        ));
        assert_eq!(
            sleeper.waits(),
            vec![Duration::from_millis(500), Duration::from_millis(1000)]
        );
        assert_eq!(t.transient_retries(), 2);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let t = transport(RetryPolicy::default(), sleeper.clone());
        let calls = AtomicUsize::new(0);
        let script = [UpstreamError::Private];

        let err = t.call("lookup", || scripted(&calls, &script)).await.unwrap_err();

        assert!(matches!(err, TransportError::Terminal(UpstreamError::Private)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let t = transport(RetryPolicy::default(), sleeper);
        t.cancel_handle().cancel();
        let calls = AtomicUsize::new(0);

        let err = t.call("test", || scripted(&calls, &[])).await.unwrap_err();
        assert!(matches!(err, TransportError::Failed(PostpackError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_into_network() {
        let err = TransportError::Terminal(UpstreamError::Gone("deleted".into()));
        assert!(err.into_network("fetch_history").is_network());
    }
}
