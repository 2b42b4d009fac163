//! Mock activity context for unit testing activities in isolation.

use crate::activity::context::{ActivityContext, ActivityInfo};
use crate::error::ActivityError;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weft_core::{ActivityType, Payload, WorkflowExecution};

/// Mock implementation of [`ActivityContext`] for testing activities in isolation.
///
/// Heartbeats are recorded instead of sent, and cancellation can be
/// triggered by the test at any point.
///
/// # Example
///
/// ```ignore
/// use weft_sdk::testing::MockActivityContext;
///
/// let ctx = MockActivityContext::builder().activity_type("charge").build();
/// my_activity.execute(input, &ctx).await?;
/// assert_eq!(ctx.heartbeats().len(), 2);
/// ```
#[derive(Clone)]
pub struct MockActivityContext {
    inner: Arc<MockActivityContextInner>,
}

struct MockActivityContextInner {
    info: ActivityInfo,
    heartbeat_details: Option<Payload>,
    heartbeats: RwLock<Vec<Option<Payload>>>,
    cancel_on_heartbeat: AtomicBool,
    cancel: CancellationToken,
    worker_stop: CancellationToken,
}

impl MockActivityContext {
    pub fn builder() -> MockActivityContextBuilder {
        MockActivityContextBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Details of every recorded heartbeat, oldest first
    pub fn heartbeats(&self) -> Vec<Option<Payload>> {
        self.inner.heartbeats.read().clone()
    }

    pub fn last_heartbeat(&self) -> Option<Option<Payload>> {
        self.inner.heartbeats.read().last().cloned()
    }

    /// Cancel the activity as a deadline or cancellation request would
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Make the next heartbeat report a cancellation request
    pub fn cancel_on_next_heartbeat(&self) {
        self.inner.cancel_on_heartbeat.store(true, Ordering::SeqCst);
    }

    /// Signal worker shutdown
    pub fn stop_worker(&self) {
        self.inner.worker_stop.cancel();
    }

    pub fn clear_recordings(&self) {
        self.inner.heartbeats.write().clear();
    }
}

impl Default for MockActivityContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`MockActivityContext`]
#[derive(Default)]
pub struct MockActivityContextBuilder {
    activity_id: Option<String>,
    activity_type: Option<String>,
    attempt: i32,
    heartbeat_timeout: Duration,
    heartbeat_details: Option<Payload>,
    cancelled: bool,
}

impl MockActivityContextBuilder {
    pub fn activity_id(mut self, id: impl Into<String>) -> Self {
        self.activity_id = Some(id.into());
        self
    }

    pub fn activity_type(mut self, name: impl Into<String>) -> Self {
        self.activity_type = Some(name.into());
        self
    }

    pub fn attempt(mut self, attempt: i32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Details left by the previous attempt's last heartbeat
    pub fn heartbeat_details(mut self, details: impl Into<Payload>) -> Self {
        self.heartbeat_details = Some(details.into());
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.cancelled = true;
        self
    }

    pub fn build(self) -> MockActivityContext {
        let now = Utc::now();
        let info = ActivityInfo {
            task_token: b"mock-token".to_vec(),
            workflow_execution: WorkflowExecution::new("mock-workflow", "mock-run"),
            activity_id: self.activity_id.unwrap_or_else(|| "1".to_string()),
            activity_type: ActivityType::new(
                self.activity_type.unwrap_or_else(|| "mock-activity".to_string()),
            ),
            task_list: "mock-task-list".to_string(),
            attempt: self.attempt,
            scheduled_timestamp: now,
            started_timestamp: now,
            deadline: now + ChronoDuration::hours(1),
            heartbeat_timeout: self.heartbeat_timeout,
        };

        let cancel = CancellationToken::new();
        if self.cancelled {
            cancel.cancel();
        }

        MockActivityContext {
            inner: Arc::new(MockActivityContextInner {
                info,
                heartbeat_details: self.heartbeat_details,
                heartbeats: RwLock::new(Vec::new()),
                cancel_on_heartbeat: AtomicBool::new(false),
                cancel,
                worker_stop: CancellationToken::new(),
            }),
        }
    }
}

#[async_trait]
impl ActivityContext for MockActivityContext {
    fn info(&self) -> &ActivityInfo {
        &self.inner.info
    }

    fn heartbeat_details(&self) -> Option<&Payload> {
        self.inner.heartbeat_details.as_ref()
    }

    async fn record_heartbeat(&self, details: Option<Payload>) -> Result<(), ActivityError> {
        self.check_cancellation()?;
        self.inner.heartbeats.write().push(details);

        if self.inner.cancel_on_heartbeat.swap(false, Ordering::SeqCst) {
            self.inner.cancel.cancel();
            return Err(ActivityError::Canceled { details: None });
        }
        Ok(())
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    fn worker_stop_token(&self) -> CancellationToken {
        self.inner.worker_stop.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::context::ActivityContextExt;

    #[test]
    fn test_mock_activity_context_builder() {
        let ctx = MockActivityContext::builder()
            .activity_id("7")
            .activity_type("charge")
            .attempt(2)
            .heartbeat_details(b"\"page-3\"".to_vec())
            .build();

        assert_eq!(ctx.info().activity_id, "7");
        assert_eq!(ctx.info().activity_type.name, "charge");
        assert_eq!(ctx.info().attempt, 2);
        assert_eq!(
            ctx.heartbeat_details_as::<String>().unwrap(),
            Some("page-3".to_string())
        );
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_mock_activity_context_records_heartbeats() {
        let ctx = MockActivityContext::new();

        ctx.record_heartbeat(None).await.unwrap();
        ctx.heartbeat_with(&3u32).await.unwrap();

        assert_eq!(ctx.heartbeats().len(), 2);
        assert_eq!(ctx.last_heartbeat(), Some(Some(b"3".to_vec())));

        ctx.clear_recordings();
        assert!(ctx.heartbeats().is_empty());
    }

    #[tokio::test]
    async fn test_mock_activity_context_cancel_on_heartbeat() {
        let ctx = MockActivityContext::new();
        ctx.cancel_on_next_heartbeat();

        let err = ctx.record_heartbeat(None).await.unwrap_err();
        assert!(matches!(err, ActivityError::Canceled { .. }));
        assert!(ctx.is_cancelled());
        assert!(ctx.check_cancellation().is_err());
    }

    #[test]
    fn test_mock_activity_context_clone_shares_state() {
        let ctx1 = MockActivityContext::builder().cancelled().build();
        let ctx2 = ctx1.clone();
        assert!(ctx2.is_cancelled());

        ctx1.stop_worker();
        assert!(ctx2.worker_stop_token().is_cancelled());
    }
}
