//! History event types recorded by the orchestration service

use crate::types::{
    ActivityType, Payload, SearchAttributes, TaskList, TimeoutType, WorkflowExecution,
    WorkflowType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Every kind of event that can appear in a run's history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Workflow lifecycle events
    WorkflowExecutionStarted,
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed,
    WorkflowExecutionTimedOut,
    WorkflowExecutionCancelRequested,
    WorkflowExecutionCanceled,
    WorkflowExecutionTerminated,
    WorkflowExecutionContinuedAsNew,
    WorkflowExecutionSignaled,

    // Decision task events
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted,
    DecisionTaskTimedOut,
    DecisionTaskFailed,

    // Activity events
    ActivityTaskScheduled,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ActivityTaskCancelRequested,
    RequestCancelActivityTaskFailed,
    ActivityTaskCanceled,

    // Timer events
    TimerStarted,
    TimerFired,
    TimerCanceled,
    CancelTimerFailed,

    // Marker events
    MarkerRecorded,

    // External workflow events
    RequestCancelExternalWorkflowExecutionInitiated,
    RequestCancelExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionCancelRequested,
    SignalExternalWorkflowExecutionInitiated,
    SignalExternalWorkflowExecutionFailed,
    ExternalWorkflowExecutionSignaled,

    // Child workflow events
    StartChildWorkflowExecutionInitiated,
    StartChildWorkflowExecutionFailed,
    ChildWorkflowExecutionStarted,
    ChildWorkflowExecutionCompleted,
    ChildWorkflowExecutionFailed,
    ChildWorkflowExecutionCanceled,
    ChildWorkflowExecutionTimedOut,
    ChildWorkflowExecutionTerminated,

    // Visibility events
    UpsertWorkflowSearchAttributes,
}

impl EventType {
    /// Whether the service records this event as the direct outcome of a decision.
    ///
    /// Decision-shaped events are the ones replay compares against the
    /// decisions produced by workflow code. The match has no wildcard arm so a
    /// new event type has to be classified here before the crate compiles.
    pub fn is_decision_event(&self) -> bool {
        match self {
            Self::ActivityTaskScheduled
            | Self::ActivityTaskCancelRequested
            | Self::RequestCancelActivityTaskFailed
            | Self::TimerStarted
            | Self::TimerCanceled
            | Self::CancelTimerFailed
            | Self::WorkflowExecutionCompleted
            | Self::WorkflowExecutionFailed
            | Self::WorkflowExecutionCanceled
            | Self::WorkflowExecutionContinuedAsNew
            | Self::MarkerRecorded
            | Self::RequestCancelExternalWorkflowExecutionInitiated
            | Self::SignalExternalWorkflowExecutionInitiated
            | Self::StartChildWorkflowExecutionInitiated
            | Self::UpsertWorkflowSearchAttributes => true,

            Self::WorkflowExecutionStarted
            | Self::WorkflowExecutionTimedOut
            | Self::WorkflowExecutionCancelRequested
            | Self::WorkflowExecutionTerminated
            | Self::WorkflowExecutionSignaled
            | Self::DecisionTaskScheduled
            | Self::DecisionTaskStarted
            | Self::DecisionTaskCompleted
            | Self::DecisionTaskTimedOut
            | Self::DecisionTaskFailed
            | Self::ActivityTaskStarted
            | Self::ActivityTaskCompleted
            | Self::ActivityTaskFailed
            | Self::ActivityTaskTimedOut
            | Self::ActivityTaskCanceled
            | Self::TimerFired
            | Self::RequestCancelExternalWorkflowExecutionFailed
            | Self::ExternalWorkflowExecutionCancelRequested
            | Self::SignalExternalWorkflowExecutionFailed
            | Self::ExternalWorkflowExecutionSignaled
            | Self::StartChildWorkflowExecutionFailed
            | Self::ChildWorkflowExecutionStarted
            | Self::ChildWorkflowExecutionCompleted
            | Self::ChildWorkflowExecutionFailed
            | Self::ChildWorkflowExecutionCanceled
            | Self::ChildWorkflowExecutionTimedOut
            | Self::ChildWorkflowExecutionTerminated => false,
        }
    }

    /// Decision task bookkeeping events, which never reach workflow code.
    pub fn is_decision_task_event(&self) -> bool {
        matches!(
            self,
            Self::DecisionTaskScheduled
                | Self::DecisionTaskStarted
                | Self::DecisionTaskCompleted
                | Self::DecisionTaskTimedOut
                | Self::DecisionTaskFailed
        )
    }

    /// Check if this event closes the run
    pub fn is_workflow_terminal(&self) -> bool {
        matches!(
            self,
            Self::WorkflowExecutionCompleted
                | Self::WorkflowExecutionFailed
                | Self::WorkflowExecutionTimedOut
                | Self::WorkflowExecutionCanceled
                | Self::WorkflowExecutionTerminated
                | Self::WorkflowExecutionContinuedAsNew
        )
    }
}

/// Why a decision task was failed by the worker or the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionTaskFailedCause {
    UnhandledDecision,
    BadScheduleActivityAttributes,
    BadRecordMarkerAttributes,
    BadStartTimerAttributes,
    BadSearchAttributes,
    StartTimerDuplicateId,
    ResetStickyTasklist,
    WorkflowWorkerUnhandledFailure,
    ForceCloseDecision,
    FailoverCloseDecision,
}

/// Typed attributes of a history event.
///
/// The event type is derived from the variant, so a type and its attributes
/// can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventAttributes {
    WorkflowExecutionStarted {
        workflow_type: WorkflowType,
        task_list: TaskList,
        input: Payload,
        execution_start_to_close_timeout: Duration,
        task_start_to_close_timeout: Duration,
        #[serde(default)]
        attempt: i32,
        #[serde(default)]
        continued_execution_run_id: Option<String>,
        #[serde(default)]
        parent_workflow_execution: Option<WorkflowExecution>,
        #[serde(default)]
        search_attributes: Option<SearchAttributes>,
    },
    WorkflowExecutionCompleted {
        result: Payload,
        decision_task_completed_event_id: i64,
    },
    WorkflowExecutionFailed {
        reason: String,
        details: Payload,
        decision_task_completed_event_id: i64,
    },
    WorkflowExecutionTimedOut {
        timeout_type: TimeoutType,
    },
    WorkflowExecutionCancelRequested {
        cause: String,
        #[serde(default)]
        external_workflow_execution: Option<WorkflowExecution>,
        identity: String,
    },
    WorkflowExecutionCanceled {
        details: Payload,
        decision_task_completed_event_id: i64,
    },
    WorkflowExecutionTerminated {
        reason: String,
        details: Payload,
        identity: String,
    },
    WorkflowExecutionContinuedAsNew {
        new_execution_run_id: String,
        workflow_type: WorkflowType,
        task_list: TaskList,
        input: Payload,
        decision_task_completed_event_id: i64,
    },
    WorkflowExecutionSignaled {
        signal_name: String,
        input: Payload,
        identity: String,
    },

    DecisionTaskScheduled {
        task_list: TaskList,
        start_to_close_timeout: Duration,
        attempt: i64,
    },
    DecisionTaskStarted {
        scheduled_event_id: i64,
        identity: String,
        request_id: String,
    },
    DecisionTaskCompleted {
        scheduled_event_id: i64,
        started_event_id: i64,
        identity: String,
        binary_checksum: String,
    },
    DecisionTaskTimedOut {
        scheduled_event_id: i64,
        started_event_id: i64,
        timeout_type: TimeoutType,
    },
    DecisionTaskFailed {
        scheduled_event_id: i64,
        started_event_id: i64,
        cause: DecisionTaskFailedCause,
        details: Payload,
        identity: String,
    },

    ActivityTaskScheduled {
        activity_id: String,
        activity_type: ActivityType,
        task_list: TaskList,
        input: Payload,
        schedule_to_close_timeout: Duration,
        schedule_to_start_timeout: Duration,
        start_to_close_timeout: Duration,
        heartbeat_timeout: Duration,
        decision_task_completed_event_id: i64,
    },
    ActivityTaskStarted {
        scheduled_event_id: i64,
        identity: String,
        attempt: i32,
    },
    ActivityTaskCompleted {
        result: Payload,
        scheduled_event_id: i64,
        started_event_id: i64,
    },
    ActivityTaskFailed {
        reason: String,
        details: Payload,
        scheduled_event_id: i64,
        started_event_id: i64,
    },
    ActivityTaskTimedOut {
        details: Payload,
        scheduled_event_id: i64,
        started_event_id: i64,
        timeout_type: TimeoutType,
    },
    ActivityTaskCancelRequested {
        activity_id: String,
        decision_task_completed_event_id: i64,
    },
    RequestCancelActivityTaskFailed {
        activity_id: String,
        cause: String,
        decision_task_completed_event_id: i64,
    },
    ActivityTaskCanceled {
        details: Payload,
        latest_cancel_requested_event_id: i64,
        scheduled_event_id: i64,
        started_event_id: i64,
    },

    TimerStarted {
        timer_id: String,
        start_to_fire_timeout: Duration,
        decision_task_completed_event_id: i64,
    },
    TimerFired {
        timer_id: String,
        started_event_id: i64,
    },
    TimerCanceled {
        timer_id: String,
        started_event_id: i64,
        decision_task_completed_event_id: i64,
    },
    CancelTimerFailed {
        timer_id: String,
        cause: String,
        decision_task_completed_event_id: i64,
    },

    MarkerRecorded {
        marker_name: String,
        details: Payload,
        decision_task_completed_event_id: i64,
    },

    RequestCancelExternalWorkflowExecutionInitiated {
        domain: String,
        workflow_execution: WorkflowExecution,
        control: String,
        child_workflow_only: bool,
        decision_task_completed_event_id: i64,
    },
    RequestCancelExternalWorkflowExecutionFailed {
        domain: String,
        workflow_execution: WorkflowExecution,
        initiated_event_id: i64,
        cause: String,
        control: String,
    },
    ExternalWorkflowExecutionCancelRequested {
        domain: String,
        workflow_execution: WorkflowExecution,
        initiated_event_id: i64,
    },
    SignalExternalWorkflowExecutionInitiated {
        domain: String,
        workflow_execution: WorkflowExecution,
        signal_name: String,
        input: Payload,
        control: String,
        child_workflow_only: bool,
        decision_task_completed_event_id: i64,
    },
    SignalExternalWorkflowExecutionFailed {
        domain: String,
        workflow_execution: WorkflowExecution,
        initiated_event_id: i64,
        cause: String,
        control: String,
    },
    ExternalWorkflowExecutionSignaled {
        domain: String,
        workflow_execution: WorkflowExecution,
        initiated_event_id: i64,
        control: String,
    },

    StartChildWorkflowExecutionInitiated {
        domain: String,
        workflow_id: String,
        workflow_type: WorkflowType,
        task_list: TaskList,
        input: Payload,
        execution_start_to_close_timeout: Duration,
        task_start_to_close_timeout: Duration,
        control: String,
        decision_task_completed_event_id: i64,
    },
    StartChildWorkflowExecutionFailed {
        domain: String,
        workflow_id: String,
        workflow_type: WorkflowType,
        cause: String,
        control: String,
        initiated_event_id: i64,
    },
    ChildWorkflowExecutionStarted {
        domain: String,
        workflow_execution: WorkflowExecution,
        workflow_type: WorkflowType,
        initiated_event_id: i64,
    },
    ChildWorkflowExecutionCompleted {
        result: Payload,
        domain: String,
        workflow_execution: WorkflowExecution,
        workflow_type: WorkflowType,
        initiated_event_id: i64,
        started_event_id: i64,
    },
    ChildWorkflowExecutionFailed {
        reason: String,
        details: Payload,
        domain: String,
        workflow_execution: WorkflowExecution,
        workflow_type: WorkflowType,
        initiated_event_id: i64,
        started_event_id: i64,
    },
    ChildWorkflowExecutionCanceled {
        details: Payload,
        domain: String,
        workflow_execution: WorkflowExecution,
        workflow_type: WorkflowType,
        initiated_event_id: i64,
        started_event_id: i64,
    },
    ChildWorkflowExecutionTimedOut {
        timeout_type: TimeoutType,
        domain: String,
        workflow_execution: WorkflowExecution,
        workflow_type: WorkflowType,
        initiated_event_id: i64,
        started_event_id: i64,
    },
    ChildWorkflowExecutionTerminated {
        domain: String,
        workflow_execution: WorkflowExecution,
        workflow_type: WorkflowType,
        initiated_event_id: i64,
        started_event_id: i64,
    },

    UpsertWorkflowSearchAttributes {
        search_attributes: Option<SearchAttributes>,
        decision_task_completed_event_id: i64,
    },
}

impl EventAttributes {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::WorkflowExecutionStarted { .. } => EventType::WorkflowExecutionStarted,
            Self::WorkflowExecutionCompleted { .. } => EventType::WorkflowExecutionCompleted,
            Self::WorkflowExecutionFailed { .. } => EventType::WorkflowExecutionFailed,
            Self::WorkflowExecutionTimedOut { .. } => EventType::WorkflowExecutionTimedOut,
            Self::WorkflowExecutionCancelRequested { .. } => {
                EventType::WorkflowExecutionCancelRequested
            }
            Self::WorkflowExecutionCanceled { .. } => EventType::WorkflowExecutionCanceled,
            Self::WorkflowExecutionTerminated { .. } => EventType::WorkflowExecutionTerminated,
            Self::WorkflowExecutionContinuedAsNew { .. } => {
                EventType::WorkflowExecutionContinuedAsNew
            }
            Self::WorkflowExecutionSignaled { .. } => EventType::WorkflowExecutionSignaled,
            Self::DecisionTaskScheduled { .. } => EventType::DecisionTaskScheduled,
            Self::DecisionTaskStarted { .. } => EventType::DecisionTaskStarted,
            Self::DecisionTaskCompleted { .. } => EventType::DecisionTaskCompleted,
            Self::DecisionTaskTimedOut { .. } => EventType::DecisionTaskTimedOut,
            Self::DecisionTaskFailed { .. } => EventType::DecisionTaskFailed,
            Self::ActivityTaskScheduled { .. } => EventType::ActivityTaskScheduled,
            Self::ActivityTaskStarted { .. } => EventType::ActivityTaskStarted,
            Self::ActivityTaskCompleted { .. } => EventType::ActivityTaskCompleted,
            Self::ActivityTaskFailed { .. } => EventType::ActivityTaskFailed,
            Self::ActivityTaskTimedOut { .. } => EventType::ActivityTaskTimedOut,
            Self::ActivityTaskCancelRequested { .. } => EventType::ActivityTaskCancelRequested,
            Self::RequestCancelActivityTaskFailed { .. } => {
                EventType::RequestCancelActivityTaskFailed
            }
            Self::ActivityTaskCanceled { .. } => EventType::ActivityTaskCanceled,
            Self::TimerStarted { .. } => EventType::TimerStarted,
            Self::TimerFired { .. } => EventType::TimerFired,
            Self::TimerCanceled { .. } => EventType::TimerCanceled,
            Self::CancelTimerFailed { .. } => EventType::CancelTimerFailed,
            Self::MarkerRecorded { .. } => EventType::MarkerRecorded,
            Self::RequestCancelExternalWorkflowExecutionInitiated { .. } => {
                EventType::RequestCancelExternalWorkflowExecutionInitiated
            }
            Self::RequestCancelExternalWorkflowExecutionFailed { .. } => {
                EventType::RequestCancelExternalWorkflowExecutionFailed
            }
            Self::ExternalWorkflowExecutionCancelRequested { .. } => {
                EventType::ExternalWorkflowExecutionCancelRequested
            }
            Self::SignalExternalWorkflowExecutionInitiated { .. } => {
                EventType::SignalExternalWorkflowExecutionInitiated
            }
            Self::SignalExternalWorkflowExecutionFailed { .. } => {
                EventType::SignalExternalWorkflowExecutionFailed
            }
            Self::ExternalWorkflowExecutionSignaled { .. } => {
                EventType::ExternalWorkflowExecutionSignaled
            }
            Self::StartChildWorkflowExecutionInitiated { .. } => {
                EventType::StartChildWorkflowExecutionInitiated
            }
            Self::StartChildWorkflowExecutionFailed { .. } => {
                EventType::StartChildWorkflowExecutionFailed
            }
            Self::ChildWorkflowExecutionStarted { .. } => EventType::ChildWorkflowExecutionStarted,
            Self::ChildWorkflowExecutionCompleted { .. } => {
                EventType::ChildWorkflowExecutionCompleted
            }
            Self::ChildWorkflowExecutionFailed { .. } => EventType::ChildWorkflowExecutionFailed,
            Self::ChildWorkflowExecutionCanceled { .. } => {
                EventType::ChildWorkflowExecutionCanceled
            }
            Self::ChildWorkflowExecutionTimedOut { .. } => {
                EventType::ChildWorkflowExecutionTimedOut
            }
            Self::ChildWorkflowExecutionTerminated { .. } => {
                EventType::ChildWorkflowExecutionTerminated
            }
            Self::UpsertWorkflowSearchAttributes { .. } => {
                EventType::UpsertWorkflowSearchAttributes
            }
        }
    }
}

/// An immutable entry of a run's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    /// Position in the run's history (1-indexed, strictly increasing)
    pub event_id: i64,

    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn new(event_id: i64, timestamp: DateTime<Utc>, attributes: EventAttributes) -> Self {
        Self {
            event_id,
            timestamp,
            attributes,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.attributes.event_type()
    }

    pub fn is_decision_event(&self) -> bool {
        self.event_type().is_decision_event()
    }

    /// Marker name, if this is a marker event
    pub fn marker_name(&self) -> Option<&str> {
        match &self.attributes {
            EventAttributes::MarkerRecorded { marker_name, .. } => Some(marker_name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_event_type_derived_from_attributes() {
        let event = HistoryEvent::new(
            5,
            now(),
            EventAttributes::TimerFired {
                timer_id: "0".to_string(),
                started_event_id: 4,
            },
        );
        assert_eq!(event.event_type(), EventType::TimerFired);
        assert!(!event.is_decision_event());
    }

    #[test]
    fn test_decision_task_events_are_not_decision_events() {
        for event_type in [
            EventType::DecisionTaskScheduled,
            EventType::DecisionTaskStarted,
            EventType::DecisionTaskCompleted,
            EventType::DecisionTaskTimedOut,
            EventType::DecisionTaskFailed,
        ] {
            assert!(event_type.is_decision_task_event());
            assert!(!event_type.is_decision_event());
        }
    }

    #[test]
    fn test_terminal_events() {
        assert!(EventType::WorkflowExecutionCompleted.is_workflow_terminal());
        assert!(EventType::WorkflowExecutionContinuedAsNew.is_workflow_terminal());
        assert!(!EventType::WorkflowExecutionSignaled.is_workflow_terminal());
    }

    #[test]
    fn test_marker_name() {
        let marker = HistoryEvent::new(
            7,
            now(),
            EventAttributes::MarkerRecorded {
                marker_name: "SideEffect".to_string(),
                details: vec![],
                decision_task_completed_event_id: 6,
            },
        );
        assert_eq!(marker.marker_name(), Some("SideEffect"));
    }

    #[test]
    fn test_history_event_serde_roundtrip() {
        let event = HistoryEvent::new(
            3,
            now(),
            EventAttributes::DecisionTaskStarted {
                scheduled_event_id: 2,
                identity: "worker-1".to_string(),
                request_id: "req".to_string(),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "DECISION_TASK_STARTED");
        assert_eq!(json["eventId"], 3);
        let back: HistoryEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
