//! Decision/event matching for replay validation
//!
//! During replay every decision the workflow code produces for an already
//! completed decision round must be reproduced by the decision-shaped event
//! the service recorded for it. [`decision_matches_event`] answers whether a
//! single decision and event are the same action.
//!
//! The match over [`Decision`] has no wildcard arm: a new decision variant
//! does not compile until it gets its own comparison rule here, and its
//! accepted event types are classified by [`DecisionType::accepted_event_types`]
//! and [`EventType::is_decision_event`](crate::history::EventType::is_decision_event).

use super::{Decision, DecisionType};
use crate::history::{EventAttributes, HistoryEvent};
use crate::types::SearchAttributes;

/// Check whether `event` is the history record of `decision`.
pub fn decision_matches_event(decision: &Decision, event: &HistoryEvent) -> bool {
    let decision_type: DecisionType = decision.decision_type();
    if !decision_type.accepts(event.event_type()) {
        return false;
    }

    match decision {
        Decision::ScheduleActivityTask(d) => match &event.attributes {
            EventAttributes::ActivityTaskScheduled {
                activity_id,
                activity_type,
                task_list,
                ..
            } => {
                activity_id == &d.activity_id
                    && activity_type.name == d.activity_type.name
                    && task_list.name == d.task_list.name
            }
            _ => false,
        },

        Decision::RequestCancelActivityTask(d) => match &event.attributes {
            EventAttributes::ActivityTaskCancelRequested { activity_id, .. }
            | EventAttributes::RequestCancelActivityTaskFailed { activity_id, .. } => {
                activity_id == &d.activity_id
            }
            _ => false,
        },

        Decision::StartTimer(d) => match &event.attributes {
            EventAttributes::TimerStarted { timer_id, .. } => timer_id == &d.timer_id,
            _ => false,
        },

        Decision::CancelTimer(d) => match &event.attributes {
            EventAttributes::TimerCanceled { timer_id, .. }
            | EventAttributes::CancelTimerFailed { timer_id, .. } => timer_id == &d.timer_id,
            _ => false,
        },

        // Closing decisions carry no identity beyond their type.
        Decision::CompleteWorkflowExecution(_)
        | Decision::FailWorkflowExecution(_)
        | Decision::CancelWorkflowExecution(_)
        | Decision::ContinueAsNewWorkflowExecution(_) => true,

        Decision::RecordMarker(d) => match &event.attributes {
            EventAttributes::MarkerRecorded { marker_name, .. } => marker_name == &d.marker_name,
            _ => false,
        },

        Decision::RequestCancelExternalWorkflowExecution(d) => match &event.attributes {
            EventAttributes::RequestCancelExternalWorkflowExecutionInitiated {
                domain,
                workflow_execution,
                child_workflow_only,
                ..
            } => {
                domains_match(domain, &d.domain)
                    && workflow_execution.workflow_id == d.workflow_id
                    && workflow_execution.run_id == d.run_id
                    && *child_workflow_only == d.child_workflow_only
            }
            _ => false,
        },

        Decision::SignalExternalWorkflowExecution(d) => match &event.attributes {
            EventAttributes::SignalExternalWorkflowExecutionInitiated {
                domain,
                workflow_execution,
                signal_name,
                input,
                child_workflow_only,
                ..
            } => {
                domains_match(domain, &d.domain)
                    && workflow_execution == &d.execution
                    && signal_name == &d.signal_name
                    && input == &d.input
                    && *child_workflow_only == d.child_workflow_only
            }
            _ => false,
        },

        Decision::StartChildWorkflowExecution(d) => match &event.attributes {
            EventAttributes::StartChildWorkflowExecutionInitiated {
                domain,
                workflow_id,
                workflow_type,
                ..
            } => {
                domains_match(domain, &d.domain)
                    && workflow_id == &d.workflow_id
                    && workflow_type.name == d.workflow_type.name
            }
            _ => false,
        },

        Decision::UpsertWorkflowSearchAttributes(d) => match &event.attributes {
            EventAttributes::UpsertWorkflowSearchAttributes {
                search_attributes, ..
            } => search_attributes_match(
                search_attributes.as_ref(),
                d.search_attributes.as_ref(),
            ),
            _ => false,
        },
    }
}

/// Compare two search attribute sets as unordered key/value maps.
///
/// Absent only matches absent: an empty set and a missing set differ.
pub fn search_attributes_match(
    recorded: Option<&SearchAttributes>,
    produced: Option<&SearchAttributes>,
) -> bool {
    match (recorded, produced) {
        (None, None) => true,
        (Some(recorded), Some(produced)) => recorded.indexed_fields == produced.indexed_fields,
        _ => false,
    }
}

// An empty domain on the decision means "the workflow's own domain", which
// the service fills in when recording the event.
fn domains_match(recorded: &str, produced: &str) -> bool {
    produced.is_empty() || recorded == produced
}

/// Short identifying summary of an event for non-determinism diagnostics
pub fn event_summary(event: &HistoryEvent) -> String {
    let detail = match &event.attributes {
        EventAttributes::ActivityTaskScheduled {
            activity_id,
            activity_type,
            task_list,
            ..
        } => format!(
            "(id={}, type={}, taskList={})",
            activity_id, activity_type.name, task_list.name
        ),
        EventAttributes::ActivityTaskCancelRequested { activity_id, .. }
        | EventAttributes::RequestCancelActivityTaskFailed { activity_id, .. } => {
            format!("(id={})", activity_id)
        }
        EventAttributes::TimerStarted { timer_id, .. }
        | EventAttributes::TimerCanceled { timer_id, .. }
        | EventAttributes::CancelTimerFailed { timer_id, .. } => format!("(id={})", timer_id),
        EventAttributes::MarkerRecorded { marker_name, .. } => format!("(name={})", marker_name),
        EventAttributes::StartChildWorkflowExecutionInitiated {
            workflow_id,
            workflow_type,
            ..
        } => format!("(workflowId={}, type={})", workflow_id, workflow_type.name),
        EventAttributes::SignalExternalWorkflowExecutionInitiated {
            workflow_execution,
            signal_name,
            ..
        } => format!("(execution={}, signal={})", workflow_execution, signal_name),
        EventAttributes::RequestCancelExternalWorkflowExecutionInitiated {
            workflow_execution,
            ..
        } => format!("(execution={})", workflow_execution),
        _ => String::new(),
    };
    format!("{:?}{}", event.event_type(), detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::*;
    use crate::types::{ActivityType, TaskList, WorkflowExecution, WorkflowType};
    use chrono::Utc;
    use std::time::Duration;

    fn event(attributes: EventAttributes) -> HistoryEvent {
        HistoryEvent::new(5, Utc::now(), attributes)
    }

    fn schedule_activity(activity_id: &str, activity_type: &str) -> Decision {
        Decision::ScheduleActivityTask(ScheduleActivityTaskAttributes {
            activity_id: activity_id.to_string(),
            activity_type: ActivityType::new(activity_type),
            task_list: TaskList::new("orders"),
            input: b"{}".to_vec(),
            schedule_to_close_timeout: Duration::from_secs(60),
            schedule_to_start_timeout: Duration::from_secs(10),
            start_to_close_timeout: Duration::from_secs(50),
            heartbeat_timeout: Duration::ZERO,
        })
    }

    fn activity_scheduled(activity_id: &str, activity_type: &str) -> HistoryEvent {
        event(EventAttributes::ActivityTaskScheduled {
            activity_id: activity_id.to_string(),
            activity_type: ActivityType::new(activity_type),
            task_list: TaskList::new("orders"),
            input: b"{\"changed\":true}".to_vec(),
            schedule_to_close_timeout: Duration::from_secs(60),
            schedule_to_start_timeout: Duration::from_secs(10),
            start_to_close_timeout: Duration::from_secs(50),
            heartbeat_timeout: Duration::ZERO,
            decision_task_completed_event_id: 4,
        })
    }

    fn upsert(attrs: Option<SearchAttributes>) -> Decision {
        Decision::UpsertWorkflowSearchAttributes(UpsertWorkflowSearchAttributesAttributes {
            search_attributes: attrs,
        })
    }

    fn upserted(attrs: Option<SearchAttributes>) -> HistoryEvent {
        event(EventAttributes::UpsertWorkflowSearchAttributes {
            search_attributes: attrs,
            decision_task_completed_event_id: 4,
        })
    }

    #[test]
    fn test_schedule_activity_matches_identity_not_input() {
        assert!(decision_matches_event(
            &schedule_activity("0", "charge-card"),
            &activity_scheduled("0", "charge-card")
        ));
        assert!(!decision_matches_event(
            &schedule_activity("0", "charge-card"),
            &activity_scheduled("0", "refund-card")
        ));
        assert!(!decision_matches_event(
            &schedule_activity("1", "charge-card"),
            &activity_scheduled("0", "charge-card")
        ));
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let timer_started = event(EventAttributes::TimerStarted {
            timer_id: "0".to_string(),
            start_to_fire_timeout: Duration::from_secs(1),
            decision_task_completed_event_id: 4,
        });
        assert!(!decision_matches_event(
            &schedule_activity("0", "charge-card"),
            &timer_started
        ));
    }

    #[test]
    fn test_cancel_timer_matches_canceled_and_failed_cancel() {
        let cancel = Decision::CancelTimer(CancelTimerAttributes {
            timer_id: "2".to_string(),
        });
        let canceled = event(EventAttributes::TimerCanceled {
            timer_id: "2".to_string(),
            started_event_id: 3,
            decision_task_completed_event_id: 4,
        });
        let failed = event(EventAttributes::CancelTimerFailed {
            timer_id: "2".to_string(),
            cause: "TIMER_ID_UNKNOWN".to_string(),
            decision_task_completed_event_id: 4,
        });
        let other = event(EventAttributes::TimerCanceled {
            timer_id: "9".to_string(),
            started_event_id: 3,
            decision_task_completed_event_id: 4,
        });
        assert!(decision_matches_event(&cancel, &canceled));
        assert!(decision_matches_event(&cancel, &failed));
        assert!(!decision_matches_event(&cancel, &other));
    }

    #[test]
    fn test_search_attributes_order_independent() {
        let produced = SearchAttributes::new()
            .with_field("CustomStringField", b"a".to_vec())
            .with_field("CustomIntField", b"1".to_vec());
        let recorded: SearchAttributes = vec![
            ("CustomIntField", b"1".to_vec()),
            ("CustomStringField", b"a".to_vec()),
        ]
        .into_iter()
        .collect();
        assert!(decision_matches_event(
            &upsert(Some(produced)),
            &upserted(Some(recorded))
        ));
    }

    #[test]
    fn test_search_attributes_absent_vs_empty() {
        assert!(decision_matches_event(&upsert(None), &upserted(None)));
        assert!(!decision_matches_event(
            &upsert(Some(SearchAttributes::new())),
            &upserted(None)
        ));
        assert!(!decision_matches_event(
            &upsert(None),
            &upserted(Some(SearchAttributes::new()))
        ));
    }

    #[test]
    fn test_search_attributes_value_difference() {
        let a = SearchAttributes::new().with_field("k", b"1".to_vec());
        let b = SearchAttributes::new().with_field("k", b"2".to_vec());
        assert!(!search_attributes_match(Some(&a), Some(&b)));
    }

    #[test]
    fn test_marker_matches_by_name() {
        let marker = Decision::RecordMarker(RecordMarkerAttributes {
            marker_name: "SideEffect".to_string(),
            details: b"1".to_vec(),
        });
        let recorded = event(EventAttributes::MarkerRecorded {
            marker_name: "SideEffect".to_string(),
            details: b"2".to_vec(),
            decision_task_completed_event_id: 4,
        });
        let version = event(EventAttributes::MarkerRecorded {
            marker_name: "Version".to_string(),
            details: b"1".to_vec(),
            decision_task_completed_event_id: 4,
        });
        assert!(decision_matches_event(&marker, &recorded));
        assert!(!decision_matches_event(&marker, &version));
    }

    #[test]
    fn test_signal_external_compares_input_and_domain() {
        let execution = WorkflowExecution::new("wf", "run");
        let decision = Decision::SignalExternalWorkflowExecution(
            SignalExternalWorkflowExecutionAttributes {
                domain: String::new(),
                execution: execution.clone(),
                signal_name: "approve".to_string(),
                input: b"yes".to_vec(),
                control: "3".to_string(),
                child_workflow_only: false,
            },
        );
        let recorded = |input: &[u8]| {
            event(EventAttributes::SignalExternalWorkflowExecutionInitiated {
                domain: "samples".to_string(),
                workflow_execution: execution.clone(),
                signal_name: "approve".to_string(),
                input: input.to_vec(),
                control: "3".to_string(),
                child_workflow_only: false,
                decision_task_completed_event_id: 4,
            })
        };
        assert!(decision_matches_event(&decision, &recorded(b"yes")));
        assert!(!decision_matches_event(&decision, &recorded(b"no")));
    }

    #[test]
    fn test_child_workflow_matches_type_and_id() {
        let decision =
            Decision::StartChildWorkflowExecution(StartChildWorkflowExecutionAttributes {
                domain: "samples".to_string(),
                workflow_id: "child-1".to_string(),
                workflow_type: WorkflowType::new("shipping"),
                task_list: TaskList::new("orders"),
                input: vec![],
                execution_start_to_close_timeout: Duration::from_secs(60),
                task_start_to_close_timeout: Duration::from_secs(10),
                control: "1".to_string(),
            });
        let recorded = |domain: &str| {
            event(EventAttributes::StartChildWorkflowExecutionInitiated {
                domain: domain.to_string(),
                workflow_id: "child-1".to_string(),
                workflow_type: WorkflowType::new("shipping"),
                task_list: TaskList::new("orders"),
                input: vec![],
                execution_start_to_close_timeout: Duration::from_secs(60),
                task_start_to_close_timeout: Duration::from_secs(10),
                control: "1".to_string(),
                decision_task_completed_event_id: 4,
            })
        };
        assert!(decision_matches_event(&decision, &recorded("samples")));
        assert!(!decision_matches_event(&decision, &recorded("other")));
    }

    #[test]
    fn test_event_summary() {
        let summary = event_summary(&activity_scheduled("0", "charge-card"));
        assert_eq!(
            summary,
            "ActivityTaskScheduled(id=0, type=charge-card, taskList=orders)"
        );
    }
}
