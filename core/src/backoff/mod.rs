//! Retry-with-backoff and client-side throttling
//!
//! Every component that calls the orchestration service goes through these
//! primitives: [`retry`] for a single logical call, [`ConcurrentRetrier`] for
//! a throttle shared by concurrent callers.

pub mod policy;
pub mod retry;

pub use policy::{ExponentialRetryPolicy, FixedRetryPolicy, RetryPolicy};
pub use retry::{retry, ConcurrentRetrier, Retrier, RetryError};
