//! WorkflowContextImpl - Concrete implementation of WorkflowContext

use crate::error::{WorkflowError, WorkflowResult};
use crate::workflow::context::{
    ActivityOptions, ChildWorkflowOptions, QueryHandler, WorkflowContext, WorkflowInfo,
};
use crate::workflow::env::WorkflowEnv;
use crate::workflow::future::{
    ActivityFuture, ChildWorkflowFuture, ExternalWorkflowFuture, SignalChannel, TimerFuture,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use weft_core::decision::ContinueAsNewWorkflowExecutionAttributes;
use weft_core::{Payload, SearchAttributes, TaskList, WorkflowExecution};

/// Workflow context backed by the run's replay state.
///
/// Cheap to clone; every clone observes the same state. Locks are held only
/// for the duration of a single call, never across an await point or while
/// user code runs.
#[derive(Clone)]
pub struct WorkflowContextImpl {
    env: Arc<Mutex<WorkflowEnv>>,
}

impl WorkflowContextImpl {
    pub(crate) fn new(env: Arc<Mutex<WorkflowEnv>>) -> Self {
        Self { env }
    }
}

impl WorkflowContext for WorkflowContextImpl {
    fn workflow_info(&self) -> WorkflowInfo {
        self.env.lock().info.clone()
    }

    fn now(&self) -> DateTime<Utc> {
        self.env.lock().now
    }

    fn is_replaying(&self) -> bool {
        self.env.lock().replaying
    }

    fn is_cancel_requested(&self) -> bool {
        self.env.lock().cancel_requested
    }

    fn execute_activity_raw(
        &self,
        activity_type: &str,
        input: Payload,
        options: ActivityOptions,
    ) -> ActivityFuture {
        let activity_id = self
            .env
            .lock()
            .schedule_activity(activity_type, input, options);
        ActivityFuture::new(self.env.clone(), activity_id)
    }

    fn new_timer(&self, duration: Duration) -> TimerFuture {
        let timer_id = self.env.lock().start_timer(duration);
        TimerFuture::new(self.env.clone(), timer_id)
    }

    fn side_effect_raw(
        &self,
        f: &mut dyn FnMut() -> WorkflowResult<Payload>,
    ) -> WorkflowResult<Payload> {
        let (id, recorded) = self.env.lock().begin_side_effect();
        let result = match recorded {
            Some(result) => result,
            None => f()?,
        };
        self.env.lock().record_side_effect(id, result.clone())?;
        Ok(result)
    }

    fn get_version(
        &self,
        change_id: &str,
        min_supported: i32,
        max_supported: i32,
    ) -> WorkflowResult<i32> {
        self.env
            .lock()
            .get_version(change_id, min_supported, max_supported)
    }

    fn signal_channel(&self, signal_name: &str) -> SignalChannel {
        SignalChannel::new(self.env.clone(), signal_name.to_string())
    }

    fn signal_external_workflow_raw(
        &self,
        execution: WorkflowExecution,
        signal_name: &str,
        input: Payload,
        child_workflow_only: bool,
    ) -> ExternalWorkflowFuture {
        let control = self.env.lock().signal_external_workflow(
            execution,
            signal_name,
            input,
            child_workflow_only,
        );
        ExternalWorkflowFuture::new(self.env.clone(), control)
    }

    fn request_cancel_external_workflow(
        &self,
        execution: WorkflowExecution,
    ) -> ExternalWorkflowFuture {
        let control = self.env.lock().request_cancel_external_workflow(execution);
        ExternalWorkflowFuture::new(self.env.clone(), control)
    }

    fn execute_child_workflow_raw(
        &self,
        workflow_type: &str,
        input: Payload,
        options: ChildWorkflowOptions,
    ) -> ChildWorkflowFuture {
        let workflow_id = self
            .env
            .lock()
            .start_child_workflow(workflow_type, input, options);
        ChildWorkflowFuture::new(self.env.clone(), workflow_id)
    }

    fn upsert_search_attributes(&self, attributes: SearchAttributes) {
        self.env.lock().upsert_search_attributes(attributes);
    }

    fn set_query_handler(&self, query_type: &str, handler: QueryHandler) {
        self.env.lock().set_query_handler(query_type, handler);
    }

    fn new_continue_as_new_error(&self, input: Payload) -> WorkflowError {
        let info = self.workflow_info();
        WorkflowError::ContinueAsNew(Box::new(ContinueAsNewWorkflowExecutionAttributes {
            workflow_type: info.workflow_type,
            task_list: TaskList::new(info.task_list),
            input,
            execution_start_to_close_timeout: info.execution_start_to_close_timeout,
            task_start_to_close_timeout: info.task_start_to_close_timeout,
        }))
    }
}

impl std::fmt::Debug for WorkflowContextImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContextImpl")
            .field("env", &*self.env.lock())
            .finish()
    }
}
