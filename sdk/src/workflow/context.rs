//! WorkflowContext trait definition

use crate::error::{WorkflowError, WorkflowResult};
use crate::workflow::future::{
    ActivityFuture, ChildWorkflowFuture, ExternalWorkflowFuture, SignalChannel, TimerFuture,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use weft_core::{Payload, SearchAttributes, WorkflowExecution, WorkflowType};

/// Version returned by [`WorkflowContext::get_version`] for code paths that
/// ran before the change was introduced.
pub const DEFAULT_VERSION: i32 = -1;

/// Query type answered by the runtime itself with a description of what
/// the workflow is blocked on.
pub const STACK_TRACE_QUERY_TYPE: &str = "__stack_trace";

/// Handler for a query type registered by workflow code.
///
/// Receives the raw query arguments and returns the raw answer or an error
/// message.
pub type QueryHandler = Arc<dyn Fn(&[u8]) -> Result<Payload, String> + Send + Sync>;

/// Static information about the running workflow
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkflowInfo {
    pub domain: String,
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: WorkflowType,
    pub task_list: String,
    pub execution_start_to_close_timeout: Duration,
    pub task_start_to_close_timeout: Duration,
    pub attempt: i32,
    pub continued_execution_run_id: Option<String>,
    pub parent_workflow_execution: Option<WorkflowExecution>,
    pub search_attributes: Option<SearchAttributes>,
}

/// Options for scheduling an activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityOptions {
    /// Activity id override; defaults to a deterministic sequence number
    pub activity_id: Option<String>,
    /// Task list override; defaults to the workflow's task list
    pub task_list: Option<String>,
    pub schedule_to_close_timeout: Duration,
    pub schedule_to_start_timeout: Duration,
    pub start_to_close_timeout: Duration,
    /// Zero disables heartbeat timeouts
    pub heartbeat_timeout: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ActivityOptions {
    pub const DEFAULT: Self = Self {
        activity_id: None,
        task_list: None,
        schedule_to_close_timeout: Duration::from_secs(120),
        schedule_to_start_timeout: Duration::from_secs(60),
        start_to_close_timeout: Duration::from_secs(60),
        heartbeat_timeout: Duration::ZERO,
    };

    pub fn with_activity_id(mut self, activity_id: impl Into<String>) -> Self {
        self.activity_id = Some(activity_id.into());
        self
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = Some(task_list.into());
        self
    }

    pub fn with_schedule_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_close_timeout = timeout;
        self
    }

    pub fn with_schedule_to_start_timeout(mut self, timeout: Duration) -> Self {
        self.schedule_to_start_timeout = timeout;
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }
}

/// Options for starting a child workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildWorkflowOptions {
    /// Domain override; defaults to the parent's domain
    pub domain: Option<String>,
    /// Workflow id override; defaults to `<parent run id>_<sequence>`
    pub workflow_id: Option<String>,
    /// Task list override; defaults to the parent's task list
    pub task_list: Option<String>,
    pub execution_start_to_close_timeout: Duration,
    pub task_start_to_close_timeout: Duration,
}

impl Default for ChildWorkflowOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ChildWorkflowOptions {
    pub const DEFAULT: Self = Self {
        domain: None,
        workflow_id: None,
        task_list: None,
        execution_start_to_close_timeout: Duration::from_secs(3600),
        task_start_to_close_timeout: Duration::from_secs(10),
    };

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.task_list = Some(task_list.into());
        self
    }

    pub fn with_execution_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.execution_start_to_close_timeout = timeout;
        self
    }
}

/// Context for workflow execution providing deterministic APIs.
///
/// Every operation that affects the outside world produces a decision. The
/// returned futures resolve when the matching history event is replayed,
/// so workflow code must only block on them (never on wall-clock time or
/// I/O) to stay deterministic.
///
/// This trait uses raw payloads for object-safety. For typed APIs, use the
/// extension methods provided by `WorkflowContextExt`.
pub trait WorkflowContext: Send + Sync {
    // === Identifiers ===

    fn workflow_info(&self) -> WorkflowInfo;

    // === Deterministic time and replay state ===

    /// Start time of the decision task being processed (same on replay)
    fn now(&self) -> DateTime<Utc>;

    /// Whether the code is currently re-running already recorded decisions
    fn is_replaying(&self) -> bool;

    /// Whether cancellation of this workflow has been requested
    fn is_cancel_requested(&self) -> bool;

    // === Activities ===

    /// Schedule an activity (raw payload version)
    fn execute_activity_raw(
        &self,
        activity_type: &str,
        input: Payload,
        options: ActivityOptions,
    ) -> ActivityFuture;

    // === Timers ===

    /// Start a durable timer
    fn new_timer(&self, duration: Duration) -> TimerFuture;

    // === Side effects and versioning ===

    /// Run `f` once and record its result; replay returns the recorded
    /// result without calling `f` again.
    fn side_effect_raw(
        &self,
        f: &mut dyn FnMut() -> WorkflowResult<Payload>,
    ) -> WorkflowResult<Payload>;

    /// Version of the code path guarded by `change_id`.
    ///
    /// New executions get `max_supported`; replay of history recorded
    /// before the change returns [`DEFAULT_VERSION`]. A recorded version
    /// outside `[min_supported, max_supported]` is a fault.
    fn get_version(
        &self,
        change_id: &str,
        min_supported: i32,
        max_supported: i32,
    ) -> WorkflowResult<i32>;

    // === Signals ===

    /// Channel receiving signals with the given name, in delivery order
    fn signal_channel(&self, signal_name: &str) -> SignalChannel;

    // === External workflows ===

    /// Send a signal to another workflow (raw payload version)
    fn signal_external_workflow_raw(
        &self,
        execution: WorkflowExecution,
        signal_name: &str,
        input: Payload,
        child_workflow_only: bool,
    ) -> ExternalWorkflowFuture;

    /// Ask the service to cancel another workflow
    fn request_cancel_external_workflow(
        &self,
        execution: WorkflowExecution,
    ) -> ExternalWorkflowFuture;

    // === Child workflows ===

    /// Start a child workflow (raw payload version)
    fn execute_child_workflow_raw(
        &self,
        workflow_type: &str,
        input: Payload,
        options: ChildWorkflowOptions,
    ) -> ChildWorkflowFuture;

    // === Visibility and queries ===

    fn upsert_search_attributes(&self, attributes: SearchAttributes);

    /// Register (or replace) the handler for a query type
    fn set_query_handler(&self, query_type: &str, handler: QueryHandler);

    /// Error that closes this run and starts a new one of the same type
    fn new_continue_as_new_error(&self, input: Payload) -> WorkflowError;
}

/// Extension trait for typed workflow context operations.
/// These methods provide type-safe wrappers around the raw payload methods.
pub trait WorkflowContextExt: WorkflowContext {
    /// Schedule an activity and wait for its typed result
    fn execute_activity<I: Serialize, O: DeserializeOwned>(
        &self,
        activity_type: &str,
        input: &I,
        options: ActivityOptions,
    ) -> impl Future<Output = WorkflowResult<O>> + Send {
        let future = serde_json::to_vec(input)
            .map(|input| self.execute_activity_raw(activity_type, input, options));
        async move {
            let payload = future?.await?;
            Ok(serde_json::from_slice(&payload)?)
        }
    }

    /// Start a child workflow and wait for its typed result
    fn execute_child_workflow<I: Serialize, O: DeserializeOwned>(
        &self,
        workflow_type: &str,
        input: &I,
        options: ChildWorkflowOptions,
    ) -> impl Future<Output = WorkflowResult<O>> + Send {
        let future = serde_json::to_vec(input)
            .map(|input| self.execute_child_workflow_raw(workflow_type, input, options));
        async move {
            let payload = future?.await?;
            Ok(serde_json::from_slice(&payload)?)
        }
    }

    /// Sleep for the specified duration (durable - survives restarts)
    fn sleep(&self, duration: Duration) -> impl Future<Output = WorkflowResult<()>> + Send {
        self.new_timer(duration)
    }

    /// Typed side effect
    fn side_effect<T, F>(&self, f: F) -> WorkflowResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let mut f = Some(f);
        let payload = self.side_effect_raw(&mut || -> WorkflowResult<Payload> {
            let f = f
                .take()
                .ok_or_else(|| WorkflowError::fault("side effect invoked twice"))?;
            Ok(serde_json::to_vec(&f())?)
        })?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Send a typed signal to another workflow
    fn signal_external_workflow<I: Serialize>(
        &self,
        execution: WorkflowExecution,
        signal_name: &str,
        input: &I,
    ) -> impl Future<Output = WorkflowResult<()>> + Send {
        let future = serde_json::to_vec(input).map(|input| {
            self.signal_external_workflow_raw(execution, signal_name, input, false)
        });
        async move { future?.await }
    }

    /// Answer a query type with the current value returned by `f`
    fn on_query<R, F>(&self, query_type: &str, f: F)
    where
        R: Serialize,
        F: Fn() -> R + Send + Sync + 'static,
    {
        self.set_query_handler(
            query_type,
            Arc::new(move |_args: &[u8]| serde_json::to_vec(&f()).map_err(|e| e.to_string())),
        );
    }

    /// Typed variant of [`WorkflowContext::new_continue_as_new_error`]
    fn continue_as_new<I: Serialize>(&self, input: &I) -> WorkflowError {
        match serde_json::to_vec(input) {
            Ok(input) => self.new_continue_as_new_error(input),
            Err(e) => e.into(),
        }
    }
}

// Implement WorkflowContextExt for all types that implement WorkflowContext
impl<T: WorkflowContext + ?Sized> WorkflowContextExt for T {}
