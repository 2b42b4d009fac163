//! Retry loop and client-side throttling

use super::policy::RetryPolicy;
use crate::service::ServiceError;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors that can tell a deadline expiry apart from a real failure.
///
/// A deadline error that follows another failure is usually a symptom of the
/// earlier one, so [`retry`] reports the earlier error instead.
pub trait RetryError {
    fn is_deadline_exceeded(&self) -> bool {
        false
    }
}

impl RetryError for ServiceError {
    fn is_deadline_exceeded(&self) -> bool {
        matches!(self, ServiceError::DeadlineExceeded)
    }
}

/// Attempt bookkeeping for a single retried operation.
#[derive(Debug)]
pub struct Retrier<P> {
    policy: P,
    start_time: Instant,
    attempts: u32,
}

impl<P: RetryPolicy> Retrier<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            start_time: Instant::now(),
            attempts: 0,
        }
    }

    /// Record a failed attempt and return the delay before the next one,
    /// or `None` once the policy is exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        self.policy
            .compute_next_delay(self.start_time.elapsed(), self.attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.start_time = Instant::now();
        self.attempts = 0;
    }
}

/// Run `operation` until it succeeds, the policy is exhausted, the error is
/// not retryable, or `cancel` fires during a backoff wait.
///
/// On failure the last meaningful error is returned: when a deadline error
/// follows an earlier failure, the earlier failure is kept.
pub async fn retry<T, E, P, F, Fut>(
    cancel: &CancellationToken,
    policy: P,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: RetryError + std::fmt::Display,
    P: RetryPolicy,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retrier = Retrier::new(policy);
    let mut last_err: Option<E> = None;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let retryable = is_retryable(&err);
        let err = match last_err.take() {
            Some(previous) if err.is_deadline_exceeded() => previous,
            _ => err,
        };

        let delay = match retrier.next_backoff() {
            Some(delay) if retryable => delay,
            _ => return Err(err),
        };

        debug!(
            attempt = retrier.attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying operation"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(err),
            _ = tokio::time::sleep(delay) => {}
        }
        last_err = Some(err);
    }
}

struct ThrottleState {
    retrier: Retrier<Arc<dyn RetryPolicy>>,
    failure_count: u64,
}

/// Throttle shared by many callers of the same resource.
///
/// Callers report outcomes with [`succeeded`](Self::succeeded) and
/// [`failed`](Self::failed); [`throttle`](Self::throttle) sleeps in
/// proportion to the number of consecutive failures across all of them.
pub struct ConcurrentRetrier {
    state: Mutex<ThrottleState>,
}

impl ConcurrentRetrier {
    pub fn new(policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            state: Mutex::new(ThrottleState {
                retrier: Retrier::new(policy),
                failure_count: 0,
            }),
        }
    }

    /// Sleep for the current backoff if the last calls failed.
    pub async fn throttle(&self) {
        if let Some(delay) = self.next_delay() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Like [`throttle`](Self::throttle), returning early when `cancel` fires.
    pub async fn throttle_until(&self, cancel: &CancellationToken) {
        if let Some(delay) = self.next_delay() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    pub fn succeeded(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;
        state.retrier.reset();
    }

    pub fn failed(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
    }

    pub fn failure_count(&self) -> u64 {
        self.state.lock().failure_count
    }

    fn next_delay(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        if state.failure_count == 0 {
            return None;
        }
        state.retrier.next_backoff()
    }
}

impl std::fmt::Debug for ConcurrentRetrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentRetrier")
            .field("failure_count", &self.failure_count())
            .finish()
    }
}
