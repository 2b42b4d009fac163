//! Task and response types exchanged with the orchestration service

use crate::decision::Decision;
use crate::history::{DecisionTaskFailedCause, HistoryEvent};
use crate::types::{ActivityType, Payload, TaskList, WorkflowExecution, WorkflowType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query delivered together with a decision task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowQuery {
    pub query_type: String,
    pub query_args: Payload,
}

impl WorkflowQuery {
    pub fn new(query_type: impl Into<String>) -> Self {
        Self {
            query_type: query_type.into(),
            query_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl Into<Payload>) -> Self {
        self.query_args = args.into();
        self
    }
}

/// A batch of history handed to the worker to produce the next decisions
/// or to answer a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTask {
    pub task_token: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub workflow_type: WorkflowType,
    /// First page of history, ordered by event id
    pub events: Vec<HistoryEvent>,
    /// Started event id of the last decision task that completed; 0 when none did
    pub previous_started_event_id: i64,
    /// Started event id of this decision task
    pub started_event_id: i64,
    /// Set when more history must be fetched to reach `started_event_id`
    pub next_page_token: Option<Vec<u8>>,
    pub query: Option<WorkflowQuery>,
    #[serde(default)]
    pub attempt: i64,
}

impl WorkflowTask {
    pub fn is_query(&self) -> bool {
        self.query.is_some()
    }

    pub fn run_id(&self) -> &str {
        &self.workflow_execution.run_id
    }
}

/// One invocation of an activity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTask {
    pub task_token: Vec<u8>,
    pub workflow_execution: WorkflowExecution,
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub input: Payload,
    pub scheduled_timestamp: DateTime<Utc>,
    pub started_timestamp: DateTime<Utc>,
    pub schedule_to_close_timeout: Duration,
    pub start_to_close_timeout: Duration,
    pub heartbeat_timeout: Duration,
    /// Details recorded by the last heartbeat of a previous attempt
    #[serde(default)]
    pub heartbeat_details: Option<Payload>,
    #[serde(default)]
    pub attempt: i32,
}

impl ActivityTask {
    /// Absolute deadline of this attempt.
    ///
    /// The earlier of `scheduled + schedule_to_close` and
    /// `started + start_to_close`.
    pub fn deadline(&self) -> DateTime<Utc> {
        let schedule_to_close =
            add_timeout(self.scheduled_timestamp, self.schedule_to_close_timeout);
        let start_to_close = add_timeout(self.started_timestamp, self.start_to_close_timeout);
        schedule_to_close.min(start_to_close)
    }
}

fn add_timeout(base: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|timeout| base.checked_add_signed(timeout))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Routing hint returned with completed decisions when sticky execution is on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyExecutionAttributes {
    pub worker_task_list: TaskList,
    pub schedule_to_start_timeout: Duration,
}

/// Outcome of processing a workflow task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowTaskResponse {
    /// New decisions for the run
    DecisionTaskCompleted {
        task_token: Vec<u8>,
        decisions: Vec<Decision>,
        identity: String,
        binary_checksum: String,
        /// Running checksum over every decision round of the run
        decision_checksum: String,
        sticky_attributes: Option<StickyExecutionAttributes>,
    },

    /// Workflow code hit an unrecoverable fault
    DecisionTaskFailed {
        task_token: Vec<u8>,
        cause: DecisionTaskFailedCause,
        details: Payload,
        identity: String,
        binary_checksum: String,
    },

    /// Answer to a query task
    QueryTaskCompleted {
        task_token: Vec<u8>,
        result: QueryResult,
    },
}

impl WorkflowTaskResponse {
    pub fn decisions(&self) -> Option<&[Decision]> {
        match self {
            Self::DecisionTaskCompleted { decisions, .. } => Some(decisions),
            _ => None,
        }
    }

    pub fn query_result(&self) -> Option<&QueryResult> {
        match self {
            Self::QueryTaskCompleted { result, .. } => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryResult {
    Answered(Payload),
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity_task(
        scheduled: DateTime<Utc>,
        started: DateTime<Utc>,
        schedule_to_close: Duration,
        start_to_close: Duration,
    ) -> ActivityTask {
        ActivityTask {
            task_token: b"token".to_vec(),
            workflow_execution: WorkflowExecution::new("wf", "run"),
            activity_id: "0".to_string(),
            activity_type: ActivityType::new("charge-card"),
            input: vec![],
            scheduled_timestamp: scheduled,
            started_timestamp: started,
            schedule_to_close_timeout: schedule_to_close,
            start_to_close_timeout: start_to_close,
            heartbeat_timeout: Duration::ZERO,
            heartbeat_details: None,
            attempt: 0,
        }
    }

    #[test]
    fn test_deadline_takes_schedule_to_close_when_earlier() {
        let scheduled = Utc::now();
        let started = scheduled + chrono::Duration::seconds(5);
        let task = activity_task(
            scheduled,
            started,
            Duration::from_secs(10),
            Duration::from_secs(30),
        );
        assert_eq!(task.deadline(), scheduled + chrono::Duration::seconds(10));
    }

    #[test]
    fn test_deadline_takes_start_to_close_when_earlier() {
        let scheduled = Utc::now();
        let started = scheduled + chrono::Duration::seconds(5);
        let task = activity_task(
            scheduled,
            started,
            Duration::from_secs(100),
            Duration::from_secs(30),
        );
        assert_eq!(task.deadline(), started + chrono::Duration::seconds(30));
    }

    #[test]
    fn test_query_builder() {
        let query = WorkflowQuery::new("status").with_args(b"verbose".to_vec());
        assert_eq!(query.query_type, "status");
        assert_eq!(query.query_args, b"verbose".to_vec());
    }

    #[test]
    fn test_response_accessors() {
        let response = WorkflowTaskResponse::QueryTaskCompleted {
            task_token: vec![],
            result: QueryResult::Failed("unknown queryType".to_string()),
        };
        assert!(response.decisions().is_none());
        assert_eq!(
            response.query_result(),
            Some(&QueryResult::Failed("unknown queryType".to_string()))
        );
    }
}
