//! Tracing spans for task processing.
//!
//! Every decision, query and activity task is processed inside one of these
//! spans so that log lines emitted during replay or activity execution carry
//! the workflow and task identifiers.

use tracing::Span;
use weft_core::{ActivityTask, WorkflowTask};

/// SDK version (from Cargo.toml)
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Span covering one decision task
pub fn workflow_task_span(task: &WorkflowTask) -> Span {
    tracing::info_span!(
        "workflow_task",
        workflow_id = %task.workflow_execution.workflow_id,
        run_id = %task.workflow_execution.run_id,
        workflow_type = %task.workflow_type.name,
        started_event_id = task.started_event_id,
        previous_started_event_id = task.previous_started_event_id,
        attempt = task.attempt,
        sdk_version = SDK_VERSION,
    )
}

/// Span covering one query task
pub fn query_task_span(task: &WorkflowTask) -> Span {
    let query_type = task
        .query
        .as_ref()
        .map(|query| query.query_type.as_str())
        .unwrap_or_default();
    tracing::info_span!(
        "query_task",
        workflow_id = %task.workflow_execution.workflow_id,
        run_id = %task.workflow_execution.run_id,
        workflow_type = %task.workflow_type.name,
        query_type = %query_type,
        sdk_version = SDK_VERSION,
    )
}

/// Span covering one activity attempt
pub fn activity_task_span(task_list: &str, task: &ActivityTask) -> Span {
    tracing::info_span!(
        "activity_task",
        task_list = %task_list,
        workflow_id = %task.workflow_execution.workflow_id,
        run_id = %task.workflow_execution.run_id,
        activity_id = %task.activity_id,
        activity_type = %task.activity_type.name,
        attempt = task.attempt,
        sdk_version = SDK_VERSION,
    )
}
