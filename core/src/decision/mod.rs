//! Decisions produced by workflow code
//!
//! A decision is an action a workflow execution wants to take next. Once the
//! service accepts it, it is recorded as a decision-shaped history event, and
//! replay checks that freshly produced decisions reproduce those events (see
//! [`matcher`]).

pub mod matcher;

use crate::history::EventType;
use crate::types::{ActivityType, Payload, SearchAttributes, TaskList, WorkflowExecution, WorkflowType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use matcher::decision_matches_event;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleActivityTaskAttributes {
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub task_list: TaskList,
    pub input: Payload,
    pub schedule_to_close_timeout: Duration,
    pub schedule_to_start_timeout: Duration,
    pub start_to_close_timeout: Duration,
    pub heartbeat_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCancelActivityTaskAttributes {
    pub activity_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerAttributes {
    pub timer_id: String,
    pub start_to_fire_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTimerAttributes {
    pub timer_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteWorkflowExecutionAttributes {
    pub result: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailWorkflowExecutionAttributes {
    pub reason: String,
    pub details: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelWorkflowExecutionAttributes {
    pub details: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueAsNewWorkflowExecutionAttributes {
    pub workflow_type: WorkflowType,
    pub task_list: TaskList,
    pub input: Payload,
    pub execution_start_to_close_timeout: Duration,
    pub task_start_to_close_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMarkerAttributes {
    pub marker_name: String,
    pub details: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCancelExternalWorkflowExecutionAttributes {
    pub domain: String,
    pub workflow_id: String,
    pub run_id: String,
    pub control: String,
    pub child_workflow_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalExternalWorkflowExecutionAttributes {
    pub domain: String,
    pub execution: WorkflowExecution,
    pub signal_name: String,
    pub input: Payload,
    pub control: String,
    pub child_workflow_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChildWorkflowExecutionAttributes {
    pub domain: String,
    pub workflow_id: String,
    pub workflow_type: WorkflowType,
    pub task_list: TaskList,
    pub input: Payload,
    pub execution_start_to_close_timeout: Duration,
    pub task_start_to_close_timeout: Duration,
    pub control: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertWorkflowSearchAttributesAttributes {
    pub search_attributes: Option<SearchAttributes>,
}

/// Closed set of actions workflow code can request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decisionType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    ScheduleActivityTask(ScheduleActivityTaskAttributes),
    RequestCancelActivityTask(RequestCancelActivityTaskAttributes),
    StartTimer(StartTimerAttributes),
    CancelTimer(CancelTimerAttributes),
    CompleteWorkflowExecution(CompleteWorkflowExecutionAttributes),
    FailWorkflowExecution(FailWorkflowExecutionAttributes),
    CancelWorkflowExecution(CancelWorkflowExecutionAttributes),
    ContinueAsNewWorkflowExecution(ContinueAsNewWorkflowExecutionAttributes),
    RecordMarker(RecordMarkerAttributes),
    RequestCancelExternalWorkflowExecution(RequestCancelExternalWorkflowExecutionAttributes),
    SignalExternalWorkflowExecution(SignalExternalWorkflowExecutionAttributes),
    StartChildWorkflowExecution(StartChildWorkflowExecutionAttributes),
    UpsertWorkflowSearchAttributes(UpsertWorkflowSearchAttributesAttributes),
}

impl Decision {
    pub fn decision_type(&self) -> DecisionType {
        match self {
            Self::ScheduleActivityTask(_) => DecisionType::ScheduleActivityTask,
            Self::RequestCancelActivityTask(_) => DecisionType::RequestCancelActivityTask,
            Self::StartTimer(_) => DecisionType::StartTimer,
            Self::CancelTimer(_) => DecisionType::CancelTimer,
            Self::CompleteWorkflowExecution(_) => DecisionType::CompleteWorkflowExecution,
            Self::FailWorkflowExecution(_) => DecisionType::FailWorkflowExecution,
            Self::CancelWorkflowExecution(_) => DecisionType::CancelWorkflowExecution,
            Self::ContinueAsNewWorkflowExecution(_) => {
                DecisionType::ContinueAsNewWorkflowExecution
            }
            Self::RecordMarker(_) => DecisionType::RecordMarker,
            Self::RequestCancelExternalWorkflowExecution(_) => {
                DecisionType::RequestCancelExternalWorkflowExecution
            }
            Self::SignalExternalWorkflowExecution(_) => {
                DecisionType::SignalExternalWorkflowExecution
            }
            Self::StartChildWorkflowExecution(_) => DecisionType::StartChildWorkflowExecution,
            Self::UpsertWorkflowSearchAttributes(_) => {
                DecisionType::UpsertWorkflowSearchAttributes
            }
        }
    }

    /// Whether this decision closes the workflow run
    pub fn is_workflow_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompleteWorkflowExecution(_)
                | Self::FailWorkflowExecution(_)
                | Self::CancelWorkflowExecution(_)
                | Self::ContinueAsNewWorkflowExecution(_)
        )
    }

    /// Short identifying summary used in non-determinism diagnostics
    pub fn summary(&self) -> String {
        match self {
            Self::ScheduleActivityTask(a) => format!(
                "ScheduleActivityTask(id={}, type={}, taskList={})",
                a.activity_id, a.activity_type.name, a.task_list.name
            ),
            Self::RequestCancelActivityTask(a) => {
                format!("RequestCancelActivityTask(id={})", a.activity_id)
            }
            Self::StartTimer(a) => format!("StartTimer(id={})", a.timer_id),
            Self::CancelTimer(a) => format!("CancelTimer(id={})", a.timer_id),
            Self::CompleteWorkflowExecution(_) => "CompleteWorkflowExecution".to_string(),
            Self::FailWorkflowExecution(a) => {
                format!("FailWorkflowExecution(reason={})", a.reason)
            }
            Self::CancelWorkflowExecution(_) => "CancelWorkflowExecution".to_string(),
            Self::ContinueAsNewWorkflowExecution(a) => format!(
                "ContinueAsNewWorkflowExecution(type={})",
                a.workflow_type.name
            ),
            Self::RecordMarker(a) => format!("RecordMarker(name={})", a.marker_name),
            Self::RequestCancelExternalWorkflowExecution(a) => format!(
                "RequestCancelExternalWorkflowExecution(workflowId={}, runId={})",
                a.workflow_id, a.run_id
            ),
            Self::SignalExternalWorkflowExecution(a) => format!(
                "SignalExternalWorkflowExecution(execution={}, signal={})",
                a.execution, a.signal_name
            ),
            Self::StartChildWorkflowExecution(a) => format!(
                "StartChildWorkflowExecution(workflowId={}, type={})",
                a.workflow_id, a.workflow_type.name
            ),
            Self::UpsertWorkflowSearchAttributes(a) => format!(
                "UpsertWorkflowSearchAttributes(fields={})",
                a.search_attributes.as_ref().map_or(0, |s| s.len())
            ),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Discriminant of [`Decision`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    ScheduleActivityTask,
    RequestCancelActivityTask,
    StartTimer,
    CancelTimer,
    CompleteWorkflowExecution,
    FailWorkflowExecution,
    CancelWorkflowExecution,
    ContinueAsNewWorkflowExecution,
    RecordMarker,
    RequestCancelExternalWorkflowExecution,
    SignalExternalWorkflowExecution,
    StartChildWorkflowExecution,
    UpsertWorkflowSearchAttributes,
}

impl DecisionType {
    pub const ALL: [DecisionType; 13] = [
        Self::ScheduleActivityTask,
        Self::RequestCancelActivityTask,
        Self::StartTimer,
        Self::CancelTimer,
        Self::CompleteWorkflowExecution,
        Self::FailWorkflowExecution,
        Self::CancelWorkflowExecution,
        Self::ContinueAsNewWorkflowExecution,
        Self::RecordMarker,
        Self::RequestCancelExternalWorkflowExecution,
        Self::SignalExternalWorkflowExecution,
        Self::StartChildWorkflowExecution,
        Self::UpsertWorkflowSearchAttributes,
    ];

    /// The history event the service records when it accepts this decision
    pub fn primary_event_type(self) -> EventType {
        match self {
            Self::ScheduleActivityTask => EventType::ActivityTaskScheduled,
            Self::RequestCancelActivityTask => EventType::ActivityTaskCancelRequested,
            Self::StartTimer => EventType::TimerStarted,
            Self::CancelTimer => EventType::TimerCanceled,
            Self::CompleteWorkflowExecution => EventType::WorkflowExecutionCompleted,
            Self::FailWorkflowExecution => EventType::WorkflowExecutionFailed,
            Self::CancelWorkflowExecution => EventType::WorkflowExecutionCanceled,
            Self::ContinueAsNewWorkflowExecution => EventType::WorkflowExecutionContinuedAsNew,
            Self::RecordMarker => EventType::MarkerRecorded,
            Self::RequestCancelExternalWorkflowExecution => {
                EventType::RequestCancelExternalWorkflowExecutionInitiated
            }
            Self::SignalExternalWorkflowExecution => {
                EventType::SignalExternalWorkflowExecutionInitiated
            }
            Self::StartChildWorkflowExecution => EventType::StartChildWorkflowExecutionInitiated,
            Self::UpsertWorkflowSearchAttributes => EventType::UpsertWorkflowSearchAttributes,
        }
    }

    /// Event types that may legitimately record this decision.
    ///
    /// Always starts with [`primary_event_type`](Self::primary_event_type).
    /// Cancel requests also accept the service's "target already gone"
    /// outcome: `CancelTimerFailed` when the timer fired first and
    /// `RequestCancelActivityTaskFailed` when the activity already closed.
    pub fn accepted_event_types(self) -> &'static [EventType] {
        match self {
            Self::CancelTimer => &[EventType::TimerCanceled, EventType::CancelTimerFailed],
            Self::RequestCancelActivityTask => &[
                EventType::ActivityTaskCancelRequested,
                EventType::RequestCancelActivityTaskFailed,
            ],
            Self::ScheduleActivityTask => &[EventType::ActivityTaskScheduled],
            Self::StartTimer => &[EventType::TimerStarted],
            Self::CompleteWorkflowExecution => &[EventType::WorkflowExecutionCompleted],
            Self::FailWorkflowExecution => &[EventType::WorkflowExecutionFailed],
            Self::CancelWorkflowExecution => &[EventType::WorkflowExecutionCanceled],
            Self::ContinueAsNewWorkflowExecution => {
                &[EventType::WorkflowExecutionContinuedAsNew]
            }
            Self::RecordMarker => &[EventType::MarkerRecorded],
            Self::RequestCancelExternalWorkflowExecution => {
                &[EventType::RequestCancelExternalWorkflowExecutionInitiated]
            }
            Self::SignalExternalWorkflowExecution => {
                &[EventType::SignalExternalWorkflowExecutionInitiated]
            }
            Self::StartChildWorkflowExecution => {
                &[EventType::StartChildWorkflowExecutionInitiated]
            }
            Self::UpsertWorkflowSearchAttributes => &[EventType::UpsertWorkflowSearchAttributes],
        }
    }

    pub fn accepts(self, event_type: EventType) -> bool {
        self.accepted_event_types().contains(&event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_accepted_event_is_decision_shaped() {
        for decision_type in DecisionType::ALL {
            let accepted = decision_type.accepted_event_types();
            assert_eq!(accepted[0], decision_type.primary_event_type());
            for event_type in accepted {
                assert!(
                    event_type.is_decision_event(),
                    "{:?} records {:?}, which is not classified as a decision event",
                    decision_type,
                    event_type
                );
            }
        }
    }

    #[test]
    fn test_primary_event_types_are_distinct() {
        let primaries: HashSet<EventType> = DecisionType::ALL
            .iter()
            .map(|t| t.primary_event_type())
            .collect();
        assert_eq!(primaries.len(), DecisionType::ALL.len());
    }

    #[test]
    fn test_cancel_timer_accepts_failed_cancel() {
        assert!(DecisionType::CancelTimer.accepts(EventType::TimerCanceled));
        assert!(DecisionType::CancelTimer.accepts(EventType::CancelTimerFailed));
        assert!(!DecisionType::CancelTimer.accepts(EventType::TimerFired));
        assert!(!DecisionType::StartTimer.accepts(EventType::TimerCanceled));
    }

    #[test]
    fn test_terminal_decisions() {
        let complete = Decision::CompleteWorkflowExecution(CompleteWorkflowExecutionAttributes {
            result: vec![],
        });
        let timer = Decision::StartTimer(StartTimerAttributes {
            timer_id: "1".to_string(),
            start_to_fire_timeout: Duration::from_secs(5),
        });
        assert!(complete.is_workflow_terminal());
        assert!(!timer.is_workflow_terminal());
        assert_eq!(timer.to_string(), "StartTimer(id=1)");
    }

    #[test]
    fn test_decision_serializes_with_type_tag() {
        let decision = Decision::CancelTimer(CancelTimerAttributes {
            timer_id: "3".to_string(),
        });
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["decisionType"], "CANCEL_TIMER");
        assert_eq!(json["timerId"], "3");
    }
}
