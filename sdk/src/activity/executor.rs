//! ActivityTaskHandler - Runs activity tasks under their deadline

use crate::activity::context::{ActivityContext, ActivityContextImpl, ActivityInfo};
use crate::activity::invoker::ServiceInvoker;
use crate::activity::registry::ActivityRegistry;
use crate::config::WorkerOptions;
use crate::error::{ActivityError, Result};
use crate::telemetry::activity_task_span;
use crate::worker::execution::panic_message;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};
use weft_core::{ActivityTask, Payload, WorkflowService};

/// Executes activity tasks.
///
/// Each attempt runs until its deadline, the earlier of the
/// schedule-to-close and start-to-close limits. Worker shutdown is
/// cooperative: bodies see the stop token through their context and decide
/// themselves how to wind down.
pub struct ActivityTaskHandler {
    registry: Arc<ActivityRegistry>,
    service: Arc<dyn WorkflowService>,
    options: WorkerOptions,
    worker_stop: CancellationToken,
}

impl ActivityTaskHandler {
    pub fn new(
        registry: Arc<ActivityRegistry>,
        service: Arc<dyn WorkflowService>,
        options: WorkerOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            registry,
            service,
            options,
            worker_stop: CancellationToken::new(),
        })
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Token handed to every activity as its worker-stop signal
    pub fn worker_stop_token(&self) -> CancellationToken {
        self.worker_stop.clone()
    }

    /// Signal running and future activities that the worker is stopping
    pub fn stop(&self) {
        self.worker_stop.cancel();
    }

    /// Run one activity attempt and return its encoded result
    pub async fn execute(
        &self,
        task_list: &str,
        task: &ActivityTask,
    ) -> std::result::Result<Payload, ActivityError> {
        let span = activity_task_span(task_list, task);
        self.execute_inner(task_list, task).instrument(span).await
    }

    async fn execute_inner(
        &self,
        task_list: &str,
        task: &ActivityTask,
    ) -> std::result::Result<Payload, ActivityError> {
        let registered = self
            .registry
            .get(&task.activity_type.name)
            .ok_or_else(|| ActivityError::NotRegistered(task.activity_type.name.clone()))?;

        let info = ActivityInfo::from_task(task_list, task);
        let remaining = match (info.deadline - Utc::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => {
                debug!(deadline = %info.deadline, "Activity deadline already passed");
                return Err(ActivityError::DeadlineExceeded);
            }
        };
        let deadline = tokio::time::Instant::now() + remaining;

        let invoker = ServiceInvoker::new(
            Arc::clone(&self.service),
            task.task_token.clone(),
            self.options.identity.clone(),
            self.heartbeat_throttle_interval(task),
            self.options.activity.heartbeat_retry_policy.clone(),
        );
        let cancel = invoker.cancellation_token();
        let ctx: Arc<dyn ActivityContext> = Arc::new(ActivityContextImpl::new(
            info,
            task.heartbeat_details.clone(),
            invoker.clone(),
            self.worker_stop.clone(),
        ));

        let body = AssertUnwindSafe(registered.execute(ctx, task.input.clone())).catch_unwind();
        let outcome = tokio::time::timeout_at(deadline, body).await;
        invoker.close();

        match outcome {
            Ok(Ok(result)) => {
                if let Err(err) = &result {
                    debug!(error = %err, "Activity returned an error");
                }
                result
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic);
                warn!(panic = %message, "Activity panicked");
                Err(ActivityError::Panicked(message))
            }
            Err(_) => {
                cancel.cancel();
                debug!("Activity deadline exceeded");
                Err(ActivityError::DeadlineExceeded)
            }
        }
    }

    fn heartbeat_throttle_interval(&self, task: &ActivityTask) -> Duration {
        self.options
            .activity
            .heartbeat_throttle_interval(task.heartbeat_timeout)
    }
}

impl std::fmt::Debug for ActivityTaskHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityTaskHandler")
            .field("registry", &self.registry)
            .field("task_list", &self.options.task_list)
            .field("stopping", &self.worker_stop.is_cancelled())
            .finish()
    }
}
