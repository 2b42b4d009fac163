//! Replay state shared by a workflow's context and the futures it hands out
//!
//! Workflow code never talks to the service directly. Every operation is
//! turned into a decision queued here, and every history event replayed by
//! the worker resolves the matching slot here, waking the future waiting on
//! it.

use crate::error::{WorkflowError, WorkflowResult};
use crate::workflow::context::{
    ActivityOptions, ChildWorkflowOptions, QueryHandler, WorkflowInfo, DEFAULT_VERSION,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::task::{Poll, Waker};
use tracing::warn;
use weft_core::decision::{
    CancelTimerAttributes, RecordMarkerAttributes, RequestCancelActivityTaskAttributes,
    RequestCancelExternalWorkflowExecutionAttributes, ScheduleActivityTaskAttributes,
    SignalExternalWorkflowExecutionAttributes, StartChildWorkflowExecutionAttributes,
    StartTimerAttributes, UpsertWorkflowSearchAttributesAttributes,
};
use weft_core::{
    ActivityType, Decision, EventAttributes, HistoryEvent, Payload, SearchAttributes, TaskList,
    WorkflowExecution, WorkflowType,
};

pub(crate) const SIDE_EFFECT_MARKER_NAME: &str = "SideEffect";
pub(crate) const VERSION_MARKER_NAME: &str = "Version";

/// Details of a `SideEffect` marker
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SideEffectMarker {
    pub(crate) id: u64,
    pub(crate) result: Payload,
}

/// Details of a `Version` marker
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VersionMarker {
    pub(crate) change_id: String,
    pub(crate) version: i32,
}

/// Which table a slot lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Activity,
    Timer,
    ChildWorkflow,
    External,
}

/// An operation awaiting its outcome from history
#[derive(Debug)]
struct Slot {
    seq: u64,
    description: String,
    result: Option<WorkflowResult<Payload>>,
    waker: Option<Waker>,
    /// Set for child workflows once the child has started
    started: Option<WorkflowExecution>,
}

impl Slot {
    fn new(seq: u64, description: String) -> Self {
        Self {
            seq,
            description,
            result: None,
            waker: None,
            started: None,
        }
    }

    /// First outcome wins; later ones are ignored.
    fn resolve(&mut self, result: WorkflowResult<Payload>) {
        if self.result.is_none() {
            self.result = Some(result);
            if let Some(waker) = self.waker.take() {
                waker.wake();
            }
        }
    }

    fn poll(&mut self, waker: &Waker) -> Poll<WorkflowResult<Payload>> {
        match &self.result {
            Some(result) => Poll::Ready(result.clone()),
            None => {
                self.waker = Some(waker.clone());
                Poll::Pending
            }
        }
    }
}

pub(crate) struct WorkflowEnv {
    pub(crate) info: WorkflowInfo,
    pub(crate) now: DateTime<Utc>,
    pub(crate) replaying: bool,
    pub(crate) cancel_requested: bool,
    next_seq: u64,
    pending: Vec<Decision>,

    activities: HashMap<String, Slot>,
    scheduled_activities: HashMap<i64, String>,
    timers: HashMap<String, Slot>,
    children: HashMap<String, Slot>,
    initiated_children: HashMap<i64, String>,
    externals: HashMap<String, Slot>,
    initiated_externals: HashMap<i64, String>,

    signals: HashMap<String, VecDeque<Payload>>,
    signal_waiters: BTreeMap<String, Vec<Waker>>,

    side_effect_counter: u64,
    recorded_side_effects: HashMap<u64, Payload>,
    recorded_versions: HashMap<String, i32>,
    versions: HashMap<String, i32>,

    query_handlers: HashMap<String, QueryHandler>,
}

impl WorkflowEnv {
    pub(crate) fn new(info: WorkflowInfo) -> Self {
        Self {
            info,
            now: DateTime::<Utc>::default(),
            replaying: false,
            cancel_requested: false,
            next_seq: 0,
            pending: Vec::new(),
            activities: HashMap::new(),
            scheduled_activities: HashMap::new(),
            timers: HashMap::new(),
            children: HashMap::new(),
            initiated_children: HashMap::new(),
            externals: HashMap::new(),
            initiated_externals: HashMap::new(),
            signals: HashMap::new(),
            signal_waiters: BTreeMap::new(),
            side_effect_counter: 0,
            recorded_side_effects: HashMap::new(),
            recorded_versions: HashMap::new(),
            versions: HashMap::new(),
            query_handlers: HashMap::new(),
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub(crate) fn push_decision(&mut self, decision: Decision) {
        self.pending.push(decision);
    }

    /// Decisions produced since the last call, in the order they were made
    pub(crate) fn take_decisions(&mut self) -> Vec<Decision> {
        std::mem::take(&mut self.pending)
    }

    fn slots(&mut self, kind: SlotKind) -> &mut HashMap<String, Slot> {
        match kind {
            SlotKind::Activity => &mut self.activities,
            SlotKind::Timer => &mut self.timers,
            SlotKind::ChildWorkflow => &mut self.children,
            SlotKind::External => &mut self.externals,
        }
    }

    pub(crate) fn poll_slot(
        &mut self,
        kind: SlotKind,
        id: &str,
        waker: &Waker,
    ) -> Poll<WorkflowResult<Payload>> {
        match self.slots(kind).get_mut(id) {
            Some(slot) => slot.poll(waker),
            None => Poll::Ready(Err(WorkflowError::fault(format!(
                "no pending operation with id {}",
                id
            )))),
        }
    }

    pub(crate) fn is_slot_resolved(&self, kind: SlotKind, id: &str) -> bool {
        let slots = match kind {
            SlotKind::Activity => &self.activities,
            SlotKind::Timer => &self.timers,
            SlotKind::ChildWorkflow => &self.children,
            SlotKind::External => &self.externals,
        };
        slots.get(id).map_or(true, |slot| slot.result.is_some())
    }

    fn resolve(&mut self, kind: SlotKind, id: &str, result: WorkflowResult<Payload>) {
        if let Some(slot) = self.slots(kind).get_mut(id) {
            slot.resolve(result);
        }
    }

    /// Remove a still-unsent decision matching `pred`. Returns whether one was found.
    fn withdraw(&mut self, pred: impl Fn(&Decision) -> bool) -> bool {
        match self.pending.iter().position(pred) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Activities
    // ========================================================================

    pub(crate) fn schedule_activity(
        &mut self,
        activity_type: &str,
        input: Payload,
        options: ActivityOptions,
    ) -> String {
        let seq = self.next_seq();
        let activity_id = options.activity_id.unwrap_or_else(|| seq.to_string());
        let task_list = options
            .task_list
            .unwrap_or_else(|| self.info.task_list.clone());

        self.activities.insert(
            activity_id.clone(),
            Slot::new(seq, format!("activity {} ({})", activity_id, activity_type)),
        );
        self.push_decision(Decision::ScheduleActivityTask(ScheduleActivityTaskAttributes {
            activity_id: activity_id.clone(),
            activity_type: ActivityType::new(activity_type),
            task_list: TaskList::new(task_list),
            input,
            schedule_to_close_timeout: options.schedule_to_close_timeout,
            schedule_to_start_timeout: options.schedule_to_start_timeout,
            start_to_close_timeout: options.start_to_close_timeout,
            heartbeat_timeout: options.heartbeat_timeout,
        }));
        activity_id
    }

    /// Cancel an activity. An activity whose schedule decision was not sent
    /// yet is simply dropped; otherwise a cancel request is sent. Either way
    /// the future resolves as canceled right away.
    pub(crate) fn cancel_activity(&mut self, activity_id: &str) {
        if self.is_slot_resolved(SlotKind::Activity, activity_id) {
            return;
        }
        let withdrawn = self.withdraw(|d| {
            matches!(d, Decision::ScheduleActivityTask(a) if a.activity_id == activity_id)
        });
        if !withdrawn {
            self.push_decision(Decision::RequestCancelActivityTask(
                RequestCancelActivityTaskAttributes {
                    activity_id: activity_id.to_string(),
                },
            ));
        }
        self.resolve(
            SlotKind::Activity,
            activity_id,
            Err(WorkflowError::ActivityCanceled {
                activity_id: activity_id.to_string(),
                details: Vec::new(),
            }),
        );
    }

    fn resolve_activity(
        &mut self,
        scheduled_event_id: i64,
        outcome: impl FnOnce(String) -> WorkflowResult<Payload>,
    ) {
        if let Some(activity_id) = self.scheduled_activities.get(&scheduled_event_id).cloned() {
            let result = outcome(activity_id.clone());
            self.resolve(SlotKind::Activity, &activity_id, result);
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    pub(crate) fn start_timer(&mut self, duration: std::time::Duration) -> String {
        let seq = self.next_seq();
        let timer_id = seq.to_string();
        self.timers.insert(
            timer_id.clone(),
            Slot::new(seq, format!("timer {} ({:?})", timer_id, duration)),
        );
        self.push_decision(Decision::StartTimer(StartTimerAttributes {
            timer_id: timer_id.clone(),
            start_to_fire_timeout: duration,
        }));
        timer_id
    }

    pub(crate) fn cancel_timer(&mut self, timer_id: &str) {
        if self.is_slot_resolved(SlotKind::Timer, timer_id) {
            return;
        }
        let withdrawn =
            self.withdraw(|d| matches!(d, Decision::StartTimer(t) if t.timer_id == timer_id));
        if !withdrawn {
            self.push_decision(Decision::CancelTimer(CancelTimerAttributes {
                timer_id: timer_id.to_string(),
            }));
        }
        self.resolve(
            SlotKind::Timer,
            timer_id,
            Err(WorkflowError::TimerCanceled {
                timer_id: timer_id.to_string(),
            }),
        );
    }

    // ========================================================================
    // Child workflows
    // ========================================================================

    pub(crate) fn start_child_workflow(
        &mut self,
        workflow_type: &str,
        input: Payload,
        options: ChildWorkflowOptions,
    ) -> String {
        let seq = self.next_seq();
        let workflow_id = options.workflow_id.unwrap_or_else(|| {
            format!("{}_{}", self.info.workflow_execution.run_id, seq)
        });

        self.children.insert(
            workflow_id.clone(),
            Slot::new(
                seq,
                format!("child workflow {} ({})", workflow_id, workflow_type),
            ),
        );
        self.push_decision(Decision::StartChildWorkflowExecution(
            StartChildWorkflowExecutionAttributes {
                domain: options.domain.unwrap_or_else(|| self.info.domain.clone()),
                workflow_id: workflow_id.clone(),
                workflow_type: WorkflowType::new(workflow_type),
                task_list: TaskList::new(
                    options
                        .task_list
                        .unwrap_or_else(|| self.info.task_list.clone()),
                ),
                input,
                execution_start_to_close_timeout: options.execution_start_to_close_timeout,
                task_start_to_close_timeout: options.task_start_to_close_timeout,
                control: seq.to_string(),
            },
        ));
        workflow_id
    }

    pub(crate) fn child_execution(&self, workflow_id: &str) -> Option<WorkflowExecution> {
        self.children
            .get(workflow_id)
            .and_then(|slot| slot.started.clone())
    }

    /// Cancel a child workflow. A child whose start decision was not sent yet
    /// is dropped and resolves as canceled; otherwise a cancel request is
    /// sent and the future resolves once the child reports back.
    pub(crate) fn cancel_child_workflow(&mut self, workflow_id: &str) {
        if self.is_slot_resolved(SlotKind::ChildWorkflow, workflow_id) {
            return;
        }
        let withdrawn = self.withdraw(|d| {
            matches!(d, Decision::StartChildWorkflowExecution(c) if c.workflow_id == workflow_id)
        });
        if withdrawn {
            self.resolve(
                SlotKind::ChildWorkflow,
                workflow_id,
                Err(WorkflowError::ChildWorkflowCanceled {
                    workflow_id: workflow_id.to_string(),
                    details: Vec::new(),
                }),
            );
            return;
        }

        let run_id = self
            .child_execution(workflow_id)
            .map(|e| e.run_id)
            .unwrap_or_default();
        let seq = self.next_seq();
        self.push_decision(Decision::RequestCancelExternalWorkflowExecution(
            RequestCancelExternalWorkflowExecutionAttributes {
                domain: self.info.domain.clone(),
                workflow_id: workflow_id.to_string(),
                run_id,
                control: seq.to_string(),
                child_workflow_only: true,
            },
        ));
    }

    fn resolve_child(
        &mut self,
        initiated_event_id: i64,
        outcome: impl FnOnce(String) -> WorkflowResult<Payload>,
    ) {
        if let Some(workflow_id) = self.initiated_children.get(&initiated_event_id).cloned() {
            let result = outcome(workflow_id.clone());
            self.resolve(SlotKind::ChildWorkflow, &workflow_id, result);
        }
    }

    // ========================================================================
    // External workflows
    // ========================================================================

    pub(crate) fn signal_external_workflow(
        &mut self,
        execution: WorkflowExecution,
        signal_name: &str,
        input: Payload,
        child_workflow_only: bool,
    ) -> String {
        let seq = self.next_seq();
        let control = seq.to_string();
        self.externals.insert(
            control.clone(),
            Slot::new(seq, format!("signal {} to {}", signal_name, execution)),
        );
        self.push_decision(Decision::SignalExternalWorkflowExecution(
            SignalExternalWorkflowExecutionAttributes {
                domain: self.info.domain.clone(),
                execution,
                signal_name: signal_name.to_string(),
                input,
                control: control.clone(),
                child_workflow_only,
            },
        ));
        control
    }

    pub(crate) fn request_cancel_external_workflow(
        &mut self,
        execution: WorkflowExecution,
    ) -> String {
        let seq = self.next_seq();
        let control = seq.to_string();
        self.externals.insert(
            control.clone(),
            Slot::new(seq, format!("cancel request to {}", execution)),
        );
        self.push_decision(Decision::RequestCancelExternalWorkflowExecution(
            RequestCancelExternalWorkflowExecutionAttributes {
                domain: self.info.domain.clone(),
                workflow_id: execution.workflow_id,
                run_id: execution.run_id,
                control: control.clone(),
                child_workflow_only: false,
            },
        ));
        control
    }

    fn resolve_external(&mut self, initiated_event_id: i64, result: WorkflowResult<Payload>) {
        if let Some(control) = self.initiated_externals.get(&initiated_event_id).cloned() {
            self.resolve(SlotKind::External, &control, result);
        }
    }

    // ========================================================================
    // Signals
    // ========================================================================

    pub(crate) fn try_receive_signal(&mut self, signal_name: &str) -> Option<Payload> {
        self.signals
            .get_mut(signal_name)
            .and_then(|queue| queue.pop_front())
    }

    pub(crate) fn poll_signal(&mut self, signal_name: &str, waker: &Waker) -> Poll<Payload> {
        match self.try_receive_signal(signal_name) {
            Some(payload) => Poll::Ready(payload),
            None => {
                self.signal_waiters
                    .entry(signal_name.to_string())
                    .or_default()
                    .push(waker.clone());
                Poll::Pending
            }
        }
    }

    fn deliver_signal(&mut self, signal_name: &str, input: Payload) {
        self.signals
            .entry(signal_name.to_string())
            .or_default()
            .push_back(input);
        for waker in self.signal_waiters.remove(signal_name).unwrap_or_default() {
            waker.wake();
        }
    }

    // ========================================================================
    // Side effects, versions and search attributes
    // ========================================================================

    /// Allocate the id of the next side effect and return its recorded
    /// result, if history has one.
    pub(crate) fn begin_side_effect(&mut self) -> (u64, Option<Payload>) {
        self.side_effect_counter += 1;
        let id = self.side_effect_counter;
        (id, self.recorded_side_effects.remove(&id))
    }

    pub(crate) fn record_side_effect(&mut self, id: u64, result: Payload) -> WorkflowResult<()> {
        let details = serde_json::to_vec(&SideEffectMarker { id, result })?;
        self.push_decision(Decision::RecordMarker(RecordMarkerAttributes {
            marker_name: SIDE_EFFECT_MARKER_NAME.to_string(),
            details,
        }));
        Ok(())
    }

    pub(crate) fn get_version(
        &mut self,
        change_id: &str,
        min_supported: i32,
        max_supported: i32,
    ) -> WorkflowResult<i32> {
        let version = match self.versions.get(change_id).copied() {
            Some(version) => version,
            None => {
                let version = match self.recorded_versions.remove(change_id) {
                    Some(recorded) => Some(recorded),
                    None if self.replaying => None,
                    None => Some(max_supported),
                };
                match version {
                    Some(version) => {
                        let details = serde_json::to_vec(&VersionMarker {
                            change_id: change_id.to_string(),
                            version,
                        })?;
                        self.push_decision(Decision::RecordMarker(RecordMarkerAttributes {
                            marker_name: VERSION_MARKER_NAME.to_string(),
                            details,
                        }));
                        self.versions.insert(change_id.to_string(), version);
                        version
                    }
                    None => {
                        self.versions.insert(change_id.to_string(), DEFAULT_VERSION);
                        DEFAULT_VERSION
                    }
                }
            }
        };

        if version < min_supported || version > max_supported {
            return Err(WorkflowError::fault(format!(
                "version {} of change {} is outside the supported range [{}, {}]",
                version, change_id, min_supported, max_supported
            )));
        }
        Ok(version)
    }

    pub(crate) fn upsert_search_attributes(&mut self, attributes: SearchAttributes) {
        let merged = self
            .info
            .search_attributes
            .get_or_insert_with(SearchAttributes::new);
        merged
            .indexed_fields
            .extend(attributes.indexed_fields.clone());
        self.push_decision(Decision::UpsertWorkflowSearchAttributes(
            UpsertWorkflowSearchAttributesAttributes {
                search_attributes: Some(attributes),
            },
        ));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub(crate) fn set_query_handler(&mut self, query_type: &str, handler: QueryHandler) {
        self.query_handlers.insert(query_type.to_string(), handler);
    }

    pub(crate) fn query_handler(&self, query_type: &str) -> Option<QueryHandler> {
        self.query_handlers.get(query_type).cloned()
    }

    /// Human readable list of what the workflow is waiting on, oldest first
    pub(crate) fn stack_trace(&self) -> String {
        let mut blocked: Vec<(u64, &str)> = self
            .activities
            .values()
            .chain(self.timers.values())
            .chain(self.children.values())
            .chain(self.externals.values())
            .filter(|slot| slot.result.is_none() && slot.waker.is_some())
            .map(|slot| (slot.seq, slot.description.as_str()))
            .collect();
        blocked.sort_unstable_by_key(|(seq, _)| *seq);

        let mut lines: Vec<String> = blocked
            .into_iter()
            .map(|(_, description)| format!("waiting on {}", description))
            .collect();
        lines.extend(
            self.signal_waiters
                .keys()
                .map(|name| format!("waiting on signal {}", name)),
        );

        if lines.is_empty() {
            "workflow is not blocked".to_string()
        } else {
            lines.join("\n")
        }
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Load side-effect and version markers recorded for the decision round
    /// about to be replayed.
    pub(crate) fn preload_markers(&mut self, decision_events: &[HistoryEvent]) {
        for event in decision_events {
            let EventAttributes::MarkerRecorded {
                marker_name,
                details,
                ..
            } = &event.attributes
            else {
                continue;
            };
            match marker_name.as_str() {
                SIDE_EFFECT_MARKER_NAME => match serde_json::from_slice::<SideEffectMarker>(details)
                {
                    Ok(marker) => {
                        self.recorded_side_effects.insert(marker.id, marker.result);
                    }
                    Err(e) => warn!(event_id = event.event_id, error = %e, "Malformed side effect marker"),
                },
                VERSION_MARKER_NAME => match serde_json::from_slice::<VersionMarker>(details) {
                    Ok(marker) => {
                        self.recorded_versions.insert(marker.change_id, marker.version);
                    }
                    Err(e) => warn!(event_id = event.event_id, error = %e, "Malformed version marker"),
                },
                _ => {}
            }
        }
    }

    /// Remember the event ids assigned to confirmed decisions so that later
    /// outcome events can be routed back to their futures.
    pub(crate) fn on_decision_recorded(&mut self, event: &HistoryEvent) {
        match &event.attributes {
            EventAttributes::ActivityTaskScheduled { activity_id, .. } => {
                self.scheduled_activities
                    .insert(event.event_id, activity_id.clone());
            }
            EventAttributes::StartChildWorkflowExecutionInitiated { workflow_id, .. } => {
                self.initiated_children
                    .insert(event.event_id, workflow_id.clone());
            }
            EventAttributes::SignalExternalWorkflowExecutionInitiated { control, .. }
            | EventAttributes::RequestCancelExternalWorkflowExecutionInitiated {
                control, ..
            } => {
                self.initiated_externals
                    .insert(event.event_id, control.clone());
            }
            _ => {}
        }
    }

    /// Apply an outcome event, resolving whatever was waiting for it
    pub(crate) fn apply_event(&mut self, event: &HistoryEvent) {
        match &event.attributes {
            EventAttributes::ActivityTaskCompleted {
                result,
                scheduled_event_id,
                ..
            } => self.resolve_activity(*scheduled_event_id, |_| Ok(result.clone())),
            EventAttributes::ActivityTaskFailed {
                reason,
                details,
                scheduled_event_id,
                ..
            } => self.resolve_activity(*scheduled_event_id, |activity_id| {
                Err(WorkflowError::ActivityFailed {
                    activity_id,
                    reason: reason.clone(),
                    details: details.clone(),
                })
            }),
            EventAttributes::ActivityTaskTimedOut {
                details,
                scheduled_event_id,
                timeout_type,
                ..
            } => self.resolve_activity(*scheduled_event_id, |activity_id| {
                Err(WorkflowError::ActivityTimedOut {
                    activity_id,
                    timeout_type: *timeout_type,
                    details: details.clone(),
                })
            }),
            EventAttributes::ActivityTaskCanceled {
                details,
                scheduled_event_id,
                ..
            } => self.resolve_activity(*scheduled_event_id, |activity_id| {
                Err(WorkflowError::ActivityCanceled {
                    activity_id,
                    details: details.clone(),
                })
            }),

            EventAttributes::TimerFired { timer_id, .. } => {
                self.resolve(SlotKind::Timer, timer_id, Ok(Vec::new()))
            }

            EventAttributes::WorkflowExecutionSignaled {
                signal_name, input, ..
            } => self.deliver_signal(signal_name, input.clone()),
            EventAttributes::WorkflowExecutionCancelRequested { .. } => {
                self.cancel_requested = true
            }

            EventAttributes::StartChildWorkflowExecutionFailed {
                workflow_id,
                cause,
                initiated_event_id,
                ..
            } => self.resolve_child(*initiated_event_id, |_| {
                Err(WorkflowError::StartChildWorkflowFailed {
                    workflow_id: workflow_id.clone(),
                    cause: cause.clone(),
                })
            }),
            EventAttributes::ChildWorkflowExecutionStarted {
                workflow_execution,
                initiated_event_id,
                ..
            } => {
                if let Some(workflow_id) = self.initiated_children.get(initiated_event_id) {
                    if let Some(slot) = self.children.get_mut(workflow_id) {
                        slot.started = Some(workflow_execution.clone());
                    }
                }
            }
            EventAttributes::ChildWorkflowExecutionCompleted {
                result,
                initiated_event_id,
                ..
            } => self.resolve_child(*initiated_event_id, |_| Ok(result.clone())),
            EventAttributes::ChildWorkflowExecutionFailed {
                reason,
                details,
                initiated_event_id,
                ..
            } => self.resolve_child(*initiated_event_id, |workflow_id| {
                Err(WorkflowError::ChildWorkflowFailed {
                    workflow_id,
                    reason: reason.clone(),
                    details: details.clone(),
                })
            }),
            EventAttributes::ChildWorkflowExecutionCanceled {
                details,
                initiated_event_id,
                ..
            } => self.resolve_child(*initiated_event_id, |workflow_id| {
                Err(WorkflowError::ChildWorkflowCanceled {
                    workflow_id,
                    details: details.clone(),
                })
            }),
            EventAttributes::ChildWorkflowExecutionTimedOut {
                timeout_type,
                initiated_event_id,
                ..
            } => self.resolve_child(*initiated_event_id, |workflow_id| {
                Err(WorkflowError::ChildWorkflowTimedOut {
                    workflow_id,
                    timeout_type: *timeout_type,
                })
            }),
            EventAttributes::ChildWorkflowExecutionTerminated {
                initiated_event_id,
                ..
            } => self.resolve_child(*initiated_event_id, |workflow_id| {
                Err(WorkflowError::ChildWorkflowTerminated { workflow_id })
            }),

            EventAttributes::ExternalWorkflowExecutionSignaled {
                initiated_event_id,
                ..
            }
            | EventAttributes::ExternalWorkflowExecutionCancelRequested {
                initiated_event_id,
                ..
            } => self.resolve_external(*initiated_event_id, Ok(Vec::new())),
            EventAttributes::SignalExternalWorkflowExecutionFailed {
                workflow_execution,
                initiated_event_id,
                cause,
                ..
            }
            | EventAttributes::RequestCancelExternalWorkflowExecutionFailed {
                workflow_execution,
                initiated_event_id,
                cause,
                ..
            } => self.resolve_external(
                *initiated_event_id,
                Err(WorkflowError::ExternalWorkflowFailed {
                    workflow_id: workflow_execution.workflow_id.clone(),
                    cause: cause.clone(),
                }),
            ),

            _ => {}
        }
    }
}

impl std::fmt::Debug for WorkflowEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEnv")
            .field("info", &self.info)
            .field("now", &self.now)
            .field("replaying", &self.replaying)
            .field("pending", &self.pending.len())
            .field("query_handlers", &self.query_handlers.len())
            .finish()
    }
}
