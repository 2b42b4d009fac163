//! ActivityContext trait and its implementation

use crate::activity::invoker::ServiceInvoker;
use crate::error::ActivityError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weft_core::{ActivityTask, ActivityType, Payload, WorkflowExecution};

/// Identity and timing of the running activity attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityInfo {
    pub task_token: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub task_list: String,
    pub attempt: i32,
    pub scheduled_timestamp: DateTime<Utc>,
    pub started_timestamp: DateTime<Utc>,
    /// Absolute deadline of this attempt
    pub deadline: DateTime<Utc>,
    pub heartbeat_timeout: Duration,
}

impl ActivityInfo {
    pub fn from_task(task_list: &str, task: &ActivityTask) -> Self {
        Self {
            task_token: task.task_token.clone(),
            workflow_execution: task.workflow_execution.clone(),
            activity_id: task.activity_id.clone(),
            activity_type: task.activity_type.clone(),
            task_list: task_list.to_string(),
            attempt: task.attempt,
            scheduled_timestamp: task.scheduled_timestamp,
            started_timestamp: task.started_timestamp,
            deadline: task.deadline(),
            heartbeat_timeout: task.heartbeat_timeout,
        }
    }
}

/// Context handed to a running activity
#[async_trait]
pub trait ActivityContext: Send + Sync {
    fn info(&self) -> &ActivityInfo;

    /// Details recorded by the last heartbeat of a previous attempt
    fn heartbeat_details(&self) -> Option<&Payload>;

    /// Report liveness, optionally with progress details.
    ///
    /// Heartbeats are throttled; calls inside the throttle window only
    /// buffer their details. Returns [`ActivityError::Canceled`] once the
    /// service has requested cancellation.
    async fn record_heartbeat(&self, details: Option<Payload>) -> Result<(), ActivityError>;

    /// Token cancelled at the attempt deadline, on cancellation request, or
    /// when the activity no longer exists on the service
    fn cancellation_token(&self) -> CancellationToken;

    /// Token cancelled when the worker is shutting down
    fn worker_stop_token(&self) -> CancellationToken;

    fn is_cancelled(&self) -> bool {
        self.cancellation_token().is_cancelled()
    }

    /// Fail fast with [`ActivityError::Canceled`] if the activity was cancelled
    fn check_cancellation(&self) -> Result<(), ActivityError> {
        if self.is_cancelled() {
            return Err(ActivityError::Canceled { details: None });
        }
        Ok(())
    }
}

/// Typed helpers over [`ActivityContext`]
pub trait ActivityContextExt: ActivityContext {
    /// Record a heartbeat with JSON-encoded details
    fn heartbeat_with<T: Serialize>(
        &self,
        details: &T,
    ) -> impl Future<Output = Result<(), ActivityError>> + Send {
        let payload = serde_json::to_vec(details);
        async move { self.record_heartbeat(Some(payload?)).await }
    }

    /// Decode the previous attempt's heartbeat details
    fn heartbeat_details_as<T: DeserializeOwned>(&self) -> Result<Option<T>, ActivityError> {
        self.heartbeat_details()
            .map(|details| serde_json::from_slice(details))
            .transpose()
            .map_err(ActivityError::from)
    }
}

impl<C: ActivityContext + ?Sized> ActivityContextExt for C {}

/// Context backed by a [`ServiceInvoker`]
pub struct ActivityContextImpl {
    info: ActivityInfo,
    heartbeat_details: Option<Payload>,
    invoker: ServiceInvoker,
    cancel: CancellationToken,
    worker_stop: CancellationToken,
}

impl ActivityContextImpl {
    pub fn new(
        info: ActivityInfo,
        heartbeat_details: Option<Payload>,
        invoker: ServiceInvoker,
        worker_stop: CancellationToken,
    ) -> Self {
        let cancel = invoker.cancellation_token();
        Self {
            info,
            heartbeat_details,
            invoker,
            cancel,
            worker_stop,
        }
    }
}

#[async_trait]
impl ActivityContext for ActivityContextImpl {
    fn info(&self) -> &ActivityInfo {
        &self.info
    }

    fn heartbeat_details(&self) -> Option<&Payload> {
        self.heartbeat_details.as_ref()
    }

    async fn record_heartbeat(&self, details: Option<Payload>) -> Result<(), ActivityError> {
        self.invoker.heartbeat(details).await
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn worker_stop_token(&self) -> CancellationToken {
        self.worker_stop.clone()
    }
}

impl std::fmt::Debug for ActivityContextImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityContextImpl")
            .field("info", &self.info)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
