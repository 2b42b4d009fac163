//! Retry policies

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Schedule of delays between attempts of a retried operation.
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt.
    ///
    /// `attempts` is the number of invocations made so far (at least 1) and
    /// `elapsed` the time since the first one started. `None` means retries
    /// are exhausted.
    fn compute_next_delay(&self, elapsed: Duration, attempts: u32) -> Option<Duration>;
}

impl<P: RetryPolicy + ?Sized> RetryPolicy for &P {
    fn compute_next_delay(&self, elapsed: Duration, attempts: u32) -> Option<Duration> {
        (**self).compute_next_delay(elapsed, attempts)
    }
}

impl<P: RetryPolicy + ?Sized> RetryPolicy for Arc<P> {
    fn compute_next_delay(&self, elapsed: Duration, attempts: u32) -> Option<Duration> {
        (**self).compute_next_delay(elapsed, attempts)
    }
}

/// Exponential backoff with jitter, bounded by attempts and/or total time.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialRetryPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Multiplier applied for each further retry
    pub backoff_coefficient: f64,
    /// Cap on a single delay (None = uncapped)
    pub maximum_interval: Option<Duration>,
    /// Give up once this much time has passed since the first attempt
    pub expiration_interval: Option<Duration>,
    /// Total number of invocations allowed, the first one included
    pub maximum_attempts: Option<u32>,
    /// Fraction of each delay that may be randomly shaved off (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for ExponentialRetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ExponentialRetryPolicy {
    /// Policy used for service calls made while a task is running
    pub const DEFAULT: Self = Self {
        initial_interval: Duration::from_millis(100),
        backoff_coefficient: 2.0,
        maximum_interval: Some(Duration::from_secs(10)),
        expiration_interval: Some(Duration::from_secs(60)),
        maximum_attempts: None,
        jitter: 0.2,
    };

    pub fn new(initial_interval: Duration) -> Self {
        Self {
            initial_interval,
            ..Self::DEFAULT
        }
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    pub fn with_maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = Some(interval);
        self
    }

    pub fn with_expiration_interval(mut self, interval: Option<Duration>) -> Self {
        self.expiration_interval = interval;
        self
    }

    pub fn with_maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = Some(attempts);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay for the given retry without jitter
    pub fn base_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis =
            self.initial_interval.as_millis() as f64 * self.backoff_coefficient.powi(exponent);
        let delay = if millis.is_finite() && millis < u64::MAX as f64 {
            Duration::from_millis(millis as u64)
        } else {
            Duration::MAX
        };
        match self.maximum_interval {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl RetryPolicy for ExponentialRetryPolicy {
    fn compute_next_delay(&self, elapsed: Duration, attempts: u32) -> Option<Duration> {
        if let Some(max) = self.maximum_attempts {
            if attempts >= max {
                return None;
            }
        }

        let mut delay = self.base_delay(attempts);

        if let Some(expiration) = self.expiration_interval {
            if elapsed >= expiration {
                return None;
            }
            delay = delay.min(expiration - elapsed);
        }

        let jitter = self.jitter.min(1.0);
        if jitter > 0.0 && !delay.is_zero() {
            let shave: f64 = rand::thread_rng().gen_range(0.0..jitter);
            delay -= delay.mul_f64(shave);
        }

        Some(delay)
    }
}

/// Retry a fixed number of times with a constant delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRetryPolicy {
    pub interval: Duration,
    pub maximum_attempts: u32,
}

impl RetryPolicy for FixedRetryPolicy {
    fn compute_next_delay(&self, _elapsed: Duration, attempts: u32) -> Option<Duration> {
        (attempts < self.maximum_attempts).then_some(self.interval)
    }
}
