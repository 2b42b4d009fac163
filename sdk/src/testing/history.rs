//! Fluent builder for workflow histories

use crate::workflow::env::{
    SideEffectMarker, VersionMarker, SIDE_EFFECT_MARKER_NAME, VERSION_MARKER_NAME,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use weft_core::{
    ActivityType, DecisionTaskFailedCause, EventAttributes, HistoryEvent, Payload,
    SearchAttributes, TaskList, TimeoutType, WorkflowExecution, WorkflowQuery, WorkflowTask,
    WorkflowType,
};

/// Builder for the history of one workflow run.
///
/// Event ids are assigned in order starting at 1 and every event is one
/// second after the previous one. Outcome events look up the ids of the
/// events they refer to, so tests only deal with activity ids, timer ids and
/// child workflow ids.
///
/// # Example
///
/// ```ignore
/// use weft_sdk::testing::HistoryBuilder;
///
/// let history = HistoryBuilder::new()
///     .workflow_started("orders", b"{}".to_vec())
///     .decision_round()
///     .activity_scheduled("1", "charge", Vec::new())
///     .activity_completed("1", b"\"ok\"".to_vec())
///     .decision_task();
/// let task = history.workflow_task(WorkflowExecution::new("wf-1", "run-1"));
/// ```
#[derive(Debug, Clone)]
pub struct HistoryBuilder {
    events: Vec<HistoryEvent>,
    domain: String,
    task_list: String,
    workflow_type: Option<WorkflowType>,
    start_time: DateTime<Utc>,

    decision_scheduled: i64,
    decision_started: i64,
    decision_completed: i64,
    previous_started: i64,

    activities: HashMap<String, (i64, i64)>,
    timers: HashMap<String, i64>,
    children: HashMap<String, (i64, i64, WorkflowExecution, WorkflowType)>,
    externals: HashMap<String, (i64, WorkflowExecution)>,
}

impl Default for HistoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryBuilder {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            domain: "default".to_string(),
            task_list: "default-tl".to_string(),
            workflow_type: None,
            start_time: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
            decision_scheduled: 0,
            decision_started: 0,
            decision_completed: 0,
            previous_started: 0,
            activities: HashMap::new(),
            timers: HashMap::new(),
            children: HashMap::new(),
            externals: HashMap::new(),
        }
    }

    /// Set the task list recorded for the workflow and its activities
    pub fn with_task_list(mut self, task_list: &str) -> Self {
        self.task_list = task_list.to_string();
        self
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    /// Set the timestamp of the first event
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Append an event with the next id
    pub fn event(mut self, attributes: EventAttributes) -> Self {
        let event_id = self.next_event_id();
        let timestamp = self.start_time + ChronoDuration::seconds(event_id - 1);
        self.events
            .push(HistoryEvent::new(event_id, timestamp, attributes));
        self
    }

    fn next_event_id(&self) -> i64 {
        self.events.len() as i64 + 1
    }

    pub fn last_event_id(&self) -> i64 {
        self.events.len() as i64
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn build(self) -> Vec<HistoryEvent> {
        self.events
    }

    // ========================================================================
    // Workflow lifecycle
    // ========================================================================

    pub fn workflow_started(mut self, workflow_type: &str, input: impl Into<Payload>) -> Self {
        let workflow_type = WorkflowType::new(workflow_type);
        self.workflow_type = Some(workflow_type.clone());
        let task_list = TaskList::new(self.task_list.clone());
        self.event(EventAttributes::WorkflowExecutionStarted {
            workflow_type,
            task_list,
            input: input.into(),
            execution_start_to_close_timeout: Duration::from_secs(3600),
            task_start_to_close_timeout: Duration::from_secs(10),
            attempt: 0,
            continued_execution_run_id: None,
            parent_workflow_execution: None,
            search_attributes: None,
        })
    }

    pub fn workflow_completed(self, result: impl Into<Payload>) -> Self {
        let completed = self.decision_completed;
        self.event(EventAttributes::WorkflowExecutionCompleted {
            result: result.into(),
            decision_task_completed_event_id: completed,
        })
    }

    pub fn workflow_failed(self, reason: &str, details: impl Into<Payload>) -> Self {
        let completed = self.decision_completed;
        self.event(EventAttributes::WorkflowExecutionFailed {
            reason: reason.to_string(),
            details: details.into(),
            decision_task_completed_event_id: completed,
        })
    }

    pub fn signaled(self, signal_name: &str, input: impl Into<Payload>) -> Self {
        self.event(EventAttributes::WorkflowExecutionSignaled {
            signal_name: signal_name.to_string(),
            input: input.into(),
            identity: "test".to_string(),
        })
    }

    pub fn cancel_requested(self) -> Self {
        self.event(EventAttributes::WorkflowExecutionCancelRequested {
            cause: "test".to_string(),
            external_workflow_execution: None,
            identity: "test".to_string(),
        })
    }

    // ========================================================================
    // Decision tasks
    // ========================================================================

    pub fn decision_task_scheduled(mut self) -> Self {
        self.decision_scheduled = self.next_event_id();
        let task_list = TaskList::new(self.task_list.clone());
        self.event(EventAttributes::DecisionTaskScheduled {
            task_list,
            start_to_close_timeout: Duration::from_secs(10),
            attempt: 0,
        })
    }

    pub fn decision_task_started(mut self) -> Self {
        self.decision_started = self.next_event_id();
        let scheduled = self.decision_scheduled;
        self.event(EventAttributes::DecisionTaskStarted {
            scheduled_event_id: scheduled,
            identity: "test-worker".to_string(),
            request_id: format!("request-{}", scheduled),
        })
    }

    pub fn decision_task_completed(self) -> Self {
        self.decision_task_completed_with_checksum("test-binary")
    }

    pub fn decision_task_completed_with_checksum(mut self, binary_checksum: &str) -> Self {
        self.decision_completed = self.next_event_id();
        self.previous_started = self.decision_started;
        let (scheduled, started) = (self.decision_scheduled, self.decision_started);
        self.event(EventAttributes::DecisionTaskCompleted {
            scheduled_event_id: scheduled,
            started_event_id: started,
            identity: "test-worker".to_string(),
            binary_checksum: binary_checksum.to_string(),
        })
    }

    pub fn decision_task_timed_out(self) -> Self {
        let (scheduled, started) = (self.decision_scheduled, self.decision_started);
        self.event(EventAttributes::DecisionTaskTimedOut {
            scheduled_event_id: scheduled,
            started_event_id: started,
            timeout_type: TimeoutType::StartToClose,
        })
    }

    pub fn decision_task_failed(self) -> Self {
        let (scheduled, started) = (self.decision_scheduled, self.decision_started);
        self.event(EventAttributes::DecisionTaskFailed {
            scheduled_event_id: scheduled,
            started_event_id: started,
            cause: DecisionTaskFailedCause::WorkflowWorkerUnhandledFailure,
            details: Vec::new(),
            identity: "test-worker".to_string(),
        })
    }

    /// A decision task that was handed to a worker and is still open
    pub fn decision_task(self) -> Self {
        self.decision_task_scheduled().decision_task_started()
    }

    /// A decision task that completed; decision events follow
    pub fn decision_round(self) -> Self {
        self.decision_task().decision_task_completed()
    }

    // ========================================================================
    // Activities
    // ========================================================================

    pub fn activity_scheduled(
        mut self,
        activity_id: &str,
        activity_type: &str,
        input: impl Into<Payload>,
    ) -> Self {
        let scheduled = self.next_event_id();
        self.activities
            .insert(activity_id.to_string(), (scheduled, 0));
        let (task_list, completed) = (TaskList::new(self.task_list.clone()), self.decision_completed);
        self.event(EventAttributes::ActivityTaskScheduled {
            activity_id: activity_id.to_string(),
            activity_type: ActivityType::new(activity_type),
            task_list,
            input: input.into(),
            schedule_to_close_timeout: Duration::from_secs(120),
            schedule_to_start_timeout: Duration::from_secs(60),
            start_to_close_timeout: Duration::from_secs(60),
            heartbeat_timeout: Duration::ZERO,
            decision_task_completed_event_id: completed,
        })
    }

    fn activity_ids(&self, activity_id: &str) -> (i64, i64) {
        self.activities.get(activity_id).copied().unwrap_or_default()
    }

    pub fn activity_started(mut self, activity_id: &str) -> Self {
        let started = self.next_event_id();
        let (scheduled, _) = self.activity_ids(activity_id);
        self.activities
            .insert(activity_id.to_string(), (scheduled, started));
        self.event(EventAttributes::ActivityTaskStarted {
            scheduled_event_id: scheduled,
            identity: "test-worker".to_string(),
            attempt: 0,
        })
    }

    /// Started and completed events for an activity
    pub fn activity_completed(self, activity_id: &str, result: impl Into<Payload>) -> Self {
        let this = self.activity_started(activity_id);
        let (scheduled, started) = this.activity_ids(activity_id);
        this.event(EventAttributes::ActivityTaskCompleted {
            result: result.into(),
            scheduled_event_id: scheduled,
            started_event_id: started,
        })
    }

    /// Started and failed events for an activity
    pub fn activity_failed(
        self,
        activity_id: &str,
        reason: &str,
        details: impl Into<Payload>,
    ) -> Self {
        let this = self.activity_started(activity_id);
        let (scheduled, started) = this.activity_ids(activity_id);
        this.event(EventAttributes::ActivityTaskFailed {
            reason: reason.to_string(),
            details: details.into(),
            scheduled_event_id: scheduled,
            started_event_id: started,
        })
    }

    pub fn activity_timed_out(self, activity_id: &str, timeout_type: TimeoutType) -> Self {
        let (scheduled, started) = self.activity_ids(activity_id);
        self.event(EventAttributes::ActivityTaskTimedOut {
            details: Vec::new(),
            scheduled_event_id: scheduled,
            started_event_id: started,
            timeout_type,
        })
    }

    pub fn activity_cancel_requested(self, activity_id: &str) -> Self {
        let completed = self.decision_completed;
        self.event(EventAttributes::ActivityTaskCancelRequested {
            activity_id: activity_id.to_string(),
            decision_task_completed_event_id: completed,
        })
    }

    pub fn activity_canceled(self, activity_id: &str) -> Self {
        let (scheduled, started) = self.activity_ids(activity_id);
        let cancel_requested = self.last_event_id();
        self.event(EventAttributes::ActivityTaskCanceled {
            details: Vec::new(),
            latest_cancel_requested_event_id: cancel_requested,
            scheduled_event_id: scheduled,
            started_event_id: started,
        })
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub fn timer_started(mut self, timer_id: &str, duration: Duration) -> Self {
        let started = self.next_event_id();
        self.timers.insert(timer_id.to_string(), started);
        let completed = self.decision_completed;
        self.event(EventAttributes::TimerStarted {
            timer_id: timer_id.to_string(),
            start_to_fire_timeout: duration,
            decision_task_completed_event_id: completed,
        })
    }

    pub fn timer_fired(self, timer_id: &str) -> Self {
        let started = self.timers.get(timer_id).copied().unwrap_or_default();
        self.event(EventAttributes::TimerFired {
            timer_id: timer_id.to_string(),
            started_event_id: started,
        })
    }

    pub fn timer_canceled(self, timer_id: &str) -> Self {
        let started = self.timers.get(timer_id).copied().unwrap_or_default();
        let completed = self.decision_completed;
        self.event(EventAttributes::TimerCanceled {
            timer_id: timer_id.to_string(),
            started_event_id: started,
            decision_task_completed_event_id: completed,
        })
    }

    // ========================================================================
    // Markers and search attributes
    // ========================================================================

    pub fn marker_recorded(self, marker_name: &str, details: impl Into<Payload>) -> Self {
        let completed = self.decision_completed;
        self.event(EventAttributes::MarkerRecorded {
            marker_name: marker_name.to_string(),
            details: details.into(),
            decision_task_completed_event_id: completed,
        })
    }

    /// Marker recorded by the `id`-th side effect of the run
    pub fn side_effect_marker(self, id: u64, result: impl Into<Payload>) -> Self {
        let details = serde_json::to_vec(&SideEffectMarker {
            id,
            result: result.into(),
        })
        .unwrap_or_default();
        self.marker_recorded(SIDE_EFFECT_MARKER_NAME, details)
    }

    pub fn version_marker(self, change_id: &str, version: i32) -> Self {
        let details = serde_json::to_vec(&VersionMarker {
            change_id: change_id.to_string(),
            version,
        })
        .unwrap_or_default();
        self.marker_recorded(VERSION_MARKER_NAME, details)
    }

    pub fn search_attributes_upserted(self, search_attributes: SearchAttributes) -> Self {
        let completed = self.decision_completed;
        self.event(EventAttributes::UpsertWorkflowSearchAttributes {
            search_attributes: Some(search_attributes),
            decision_task_completed_event_id: completed,
        })
    }

    // ========================================================================
    // Child workflows
    // ========================================================================

    pub fn child_initiated(mut self, workflow_id: &str, workflow_type: &str, control: &str) -> Self {
        let initiated = self.next_event_id();
        let workflow_type = WorkflowType::new(workflow_type);
        self.children.insert(
            workflow_id.to_string(),
            (
                initiated,
                0,
                WorkflowExecution::new(workflow_id, ""),
                workflow_type.clone(),
            ),
        );
        let (domain, task_list, completed) = (
            self.domain.clone(),
            TaskList::new(self.task_list.clone()),
            self.decision_completed,
        );
        self.event(EventAttributes::StartChildWorkflowExecutionInitiated {
            domain,
            workflow_id: workflow_id.to_string(),
            workflow_type,
            task_list,
            input: Vec::new(),
            execution_start_to_close_timeout: Duration::from_secs(3600),
            task_start_to_close_timeout: Duration::from_secs(10),
            control: control.to_string(),
            decision_task_completed_event_id: completed,
        })
    }

    pub fn child_started(mut self, workflow_id: &str, run_id: &str) -> Self {
        let started = self.next_event_id();
        let Some(child) = self.children.get_mut(workflow_id) else {
            return self;
        };
        child.1 = started;
        child.2 = WorkflowExecution::new(workflow_id, run_id);
        let (initiated, execution, workflow_type) = (child.0, child.2.clone(), child.3.clone());
        let domain = self.domain.clone();
        self.event(EventAttributes::ChildWorkflowExecutionStarted {
            domain,
            workflow_execution: execution,
            workflow_type,
            initiated_event_id: initiated,
        })
    }

    pub fn child_completed(self, workflow_id: &str, result: impl Into<Payload>) -> Self {
        let Some((initiated, started, execution, workflow_type)) =
            self.children.get(workflow_id).cloned()
        else {
            return self;
        };
        let domain = self.domain.clone();
        self.event(EventAttributes::ChildWorkflowExecutionCompleted {
            result: result.into(),
            domain,
            workflow_execution: execution,
            workflow_type,
            initiated_event_id: initiated,
            started_event_id: started,
        })
    }

    pub fn child_failed(self, workflow_id: &str, reason: &str) -> Self {
        let Some((initiated, started, execution, workflow_type)) =
            self.children.get(workflow_id).cloned()
        else {
            return self;
        };
        let domain = self.domain.clone();
        self.event(EventAttributes::ChildWorkflowExecutionFailed {
            reason: reason.to_string(),
            details: Vec::new(),
            domain,
            workflow_execution: execution,
            workflow_type,
            initiated_event_id: initiated,
            started_event_id: started,
        })
    }

    // ========================================================================
    // External workflows
    // ========================================================================

    pub fn external_signal_initiated(
        mut self,
        execution: WorkflowExecution,
        signal_name: &str,
        input: impl Into<Payload>,
        control: &str,
    ) -> Self {
        let initiated = self.next_event_id();
        self.externals
            .insert(control.to_string(), (initiated, execution.clone()));
        let (domain, completed) = (self.domain.clone(), self.decision_completed);
        self.event(EventAttributes::SignalExternalWorkflowExecutionInitiated {
            domain,
            workflow_execution: execution,
            signal_name: signal_name.to_string(),
            input: input.into(),
            control: control.to_string(),
            child_workflow_only: false,
            decision_task_completed_event_id: completed,
        })
    }

    pub fn external_signaled(self, control: &str) -> Self {
        let Some((initiated, execution)) = self.externals.get(control).cloned() else {
            return self;
        };
        let domain = self.domain.clone();
        self.event(EventAttributes::ExternalWorkflowExecutionSignaled {
            domain,
            workflow_execution: execution,
            initiated_event_id: initiated,
            control: control.to_string(),
        })
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Decision task carrying the full history
    pub fn workflow_task(&self, execution: WorkflowExecution) -> WorkflowTask {
        self.task_after(execution, 0)
    }

    /// Decision task carrying only the events after `after_event_id`, as a
    /// sticky worker receives them
    pub fn task_after(&self, execution: WorkflowExecution, after_event_id: i64) -> WorkflowTask {
        WorkflowTask {
            task_token: format!("token-{}", self.decision_started).into_bytes(),
            workflow_execution: execution,
            workflow_type: self
                .workflow_type
                .clone()
                .unwrap_or_else(|| WorkflowType::new("")),
            events: self
                .events
                .iter()
                .filter(|event| event.event_id > after_event_id)
                .cloned()
                .collect(),
            previous_started_event_id: self.previous_started,
            started_event_id: self.decision_started,
            next_page_token: None,
            query: None,
            attempt: 0,
        }
    }

    /// Query task carrying the full history
    pub fn query_task(
        &self,
        execution: WorkflowExecution,
        query_type: &str,
        query_args: impl Into<Payload>,
    ) -> WorkflowTask {
        let mut task = self.workflow_task(execution);
        task.query = Some(WorkflowQuery::new(query_type).with_args(query_args));
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::EventType;

    #[test]
    fn test_ids_and_references() {
        let builder = HistoryBuilder::new()
            .workflow_started("orders", Vec::new())
            .decision_round()
            .activity_scheduled("1", "charge", Vec::new())
            .activity_completed("1", b"\"ok\"".to_vec())
            .decision_task();

        let events = builder.events();
        assert_eq!(events.len(), 9);
        for (index, event) in events.iter().enumerate() {
            assert_eq!(event.event_id, index as i64 + 1);
        }
        assert_eq!(events[4].event_type(), EventType::ActivityTaskScheduled);
        assert!(matches!(
            events[6].attributes,
            EventAttributes::ActivityTaskCompleted {
                scheduled_event_id: 5,
                started_event_id: 6,
                ..
            }
        ));

        let task = builder.workflow_task(WorkflowExecution::new("wf-1", "run-1"));
        assert_eq!(task.started_event_id, 9);
        assert_eq!(task.previous_started_event_id, 3);
        assert_eq!(task.workflow_type.name, "orders");
    }

    #[test]
    fn test_task_after_filters_events() {
        let builder = HistoryBuilder::new()
            .workflow_started("orders", Vec::new())
            .decision_task();
        let task = builder.task_after(WorkflowExecution::new("wf-1", "run-1"), 1);
        assert_eq!(task.events.first().map(|e| e.event_id), Some(2));
        assert_eq!(task.previous_started_event_id, 0);
    }
}
