//! Replay state of one workflow run
//!
//! An `ExecutionState` owns the suspended workflow computation together with
//! everything needed to resume it when the next decision task for the run
//! arrives: the id of the last applied event, the decisions not yet
//! confirmed by history and the running decision checksum.

use crate::error::{WeftError, WorkflowError, WorkflowResult};
use crate::worker::history::{DecisionBatch, HistoryCursor};
use crate::worker::registry::{RegisteredWorkflow, WorkflowFuture};
use crate::workflow::context::{WorkflowContext, WorkflowInfo, STACK_TRACE_QUERY_TYPE};
use crate::workflow::context_impl::WorkflowContextImpl;
use crate::workflow::env::WorkflowEnv;
use futures::task::ArcWake;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;
use weft_core::decision::matcher::event_summary;
use weft_core::decision::{
    CancelWorkflowExecutionAttributes, CompleteWorkflowExecutionAttributes,
    FailWorkflowExecutionAttributes,
};
use weft_core::{
    decision_matches_event, Decision, EventAttributes, HistoryEvent, NonDeterminismError, Payload,
    QueryResult, WorkflowExecution,
};

/// Upper bound on polls of the workflow future within one decision batch
const MAX_POLLS_PER_BATCH: usize = 10_000;

/// Why replaying a batch could not produce decisions
#[derive(Debug, thiserror::Error)]
pub(crate) enum ReplayError {
    #[error(transparent)]
    NonDeterminism(#[from] NonDeterminismError),

    /// Workflow code returned a fault or panicked
    #[error("{0}")]
    Fault(String),

    #[error(transparent)]
    Weft(#[from] WeftError),
}

/// Waker that only records that it was woken
#[derive(Debug, Default)]
struct WakeFlag(AtomicBool);

impl WakeFlag {
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

impl ArcWake for WakeFlag {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.store(true, Ordering::SeqCst);
    }
}

/// Render a caught panic payload
pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Cached replay state of a single run
pub struct ExecutionState {
    execution: WorkflowExecution,
    workflow: Arc<RegisteredWorkflow>,
    env: Arc<Mutex<WorkflowEnv>>,
    future: Option<WorkflowFuture>,
    wake_flag: Arc<WakeFlag>,
    last_event_id: i64,
    outstanding: VecDeque<Decision>,
    decision_checksum: String,
    binary_checksums: Vec<String>,
    completed: bool,
}

impl ExecutionState {
    pub fn new(
        domain: &str,
        execution: WorkflowExecution,
        workflow: Arc<RegisteredWorkflow>,
    ) -> Self {
        let info = WorkflowInfo {
            domain: domain.to_string(),
            workflow_execution: execution.clone(),
            ..Default::default()
        };
        Self {
            execution,
            workflow,
            env: Arc::new(Mutex::new(WorkflowEnv::new(info))),
            future: None,
            wake_flag: Arc::new(WakeFlag::default()),
            last_event_id: 0,
            outstanding: VecDeque::new(),
            decision_checksum: String::new(),
            binary_checksums: Vec::new(),
            completed: false,
        }
    }

    pub fn execution(&self) -> &WorkflowExecution {
        &self.execution
    }

    /// Id of the last history event applied to this state
    pub fn last_event_id(&self) -> i64 {
        self.last_event_id
    }

    /// Whether workflow code has returned
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Hex encoded SHA-256 chain over every decision round of the run
    pub fn decision_checksum(&self) -> &str {
        &self.decision_checksum
    }

    /// Binary checksums of the workers that completed earlier rounds
    pub fn binary_checksums(&self) -> &[String] {
        &self.binary_checksums
    }

    /// Decisions produced but not yet recorded in history
    pub fn outstanding_decisions(&self) -> Vec<Decision> {
        self.outstanding.iter().cloned().collect()
    }

    /// Apply every remaining decision batch of the cursor
    pub(crate) async fn replay(
        &mut self,
        cursor: &mut HistoryCursor<'_>,
    ) -> Result<(), ReplayError> {
        while let Some(batch) = cursor.next_batch().await? {
            self.process_batch(&batch)?;
        }
        Ok(())
    }

    /// Apply one decision batch and run workflow code until it blocks.
    pub(crate) fn process_batch(&mut self, batch: &DecisionBatch) -> Result<(), ReplayError> {
        {
            let mut env = self.env.lock();
            if let Some(timestamp) = batch.started_timestamp {
                env.now = timestamp;
            }
            env.replaying = batch.completed;
        }
        if let Some(checksum) = &batch.binary_checksum {
            if self.binary_checksums.last() != Some(checksum) {
                self.binary_checksums.push(checksum.clone());
            }
        }

        for event in &batch.events {
            match &event.attributes {
                EventAttributes::WorkflowExecutionStarted { .. } => self.start_workflow(event)?,
                _ => self.env.lock().apply_event(event),
            }
            self.last_event_id = event.event_id;
        }

        self.env.lock().preload_markers(&batch.decision_events);

        if !batch.events.is_empty() {
            if self.future.is_none() && !self.completed {
                return Err(WeftError::InvalidHistory(format!(
                    "run {} has no WorkflowExecutionStarted event",
                    self.execution.run_id
                ))
                .into());
            }
            self.drive()?;
        }

        let decisions = self.env.lock().take_decisions();
        if batch.started_event_id.is_some() {
            self.fold_checksum(&decisions)?;
        }
        debug!(
            run_id = %self.execution.run_id,
            started_event_id = ?batch.started_event_id,
            events = batch.events.len(),
            decisions = decisions.len(),
            replaying = batch.completed,
            "Processed decision batch"
        );
        self.outstanding.extend(decisions);

        self.confirm_decisions(batch)
    }

    fn start_workflow(&mut self, event: &HistoryEvent) -> Result<(), ReplayError> {
        let EventAttributes::WorkflowExecutionStarted {
            workflow_type,
            task_list,
            input,
            execution_start_to_close_timeout,
            task_start_to_close_timeout,
            attempt,
            continued_execution_run_id,
            parent_workflow_execution,
            search_attributes,
        } = &event.attributes
        else {
            return Ok(());
        };
        if self.future.is_some() || self.completed {
            return Err(WeftError::InvalidHistory(format!(
                "run {} started twice (event {})",
                self.execution.run_id, event.event_id
            ))
            .into());
        }

        {
            let mut env = self.env.lock();
            env.info.workflow_type = workflow_type.clone();
            env.info.task_list = task_list.name.clone();
            env.info.execution_start_to_close_timeout = *execution_start_to_close_timeout;
            env.info.task_start_to_close_timeout = *task_start_to_close_timeout;
            env.info.attempt = *attempt;
            env.info.continued_execution_run_id = continued_execution_run_id.clone();
            env.info.parent_workflow_execution = parent_workflow_execution.clone();
            env.info.search_attributes = search_attributes.clone();
            if env.now == chrono::DateTime::<chrono::Utc>::default() {
                env.now = event.timestamp;
            }
        }

        let ctx: Arc<dyn WorkflowContext> = Arc::new(WorkflowContextImpl::new(self.env.clone()));
        self.future = Some(self.workflow.start(ctx, input.clone()));
        debug!(
            run_id = %self.execution.run_id,
            workflow_type = %workflow_type.name,
            "Workflow started"
        );
        Ok(())
    }

    /// Poll the workflow until it stops waking itself
    fn drive(&mut self) -> Result<(), ReplayError> {
        let waker = futures::task::waker(self.wake_flag.clone());
        let mut cx = Context::from_waker(&waker);

        let outcome = {
            let Some(future) = self.future.as_mut() else {
                return Ok(());
            };
            let mut outcome = None;
            for _ in 0..MAX_POLLS_PER_BATCH {
                self.wake_flag.take();
                match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
                    Err(panic) => {
                        outcome = Some(Err(panic_message(panic)));
                        break;
                    }
                    Ok(Poll::Ready(result)) => {
                        outcome = Some(Ok(result));
                        break;
                    }
                    Ok(Poll::Pending) => {
                        // woken while polling: something it waits on became ready
                        if !self.wake_flag.take() {
                            return Ok(());
                        }
                    }
                }
            }
            outcome
        };

        match outcome {
            Some(Ok(result)) => {
                self.future = None;
                self.completed = true;
                self.finish(result)
            }
            Some(Err(message)) => Err(ReplayError::Fault(format!("workflow panicked: {}", message))),
            None => Err(ReplayError::Fault(format!(
                "workflow did not block after {} polls",
                MAX_POLLS_PER_BATCH
            ))),
        }
    }

    /// Turn the workflow's return value into its closing decision
    fn finish(&mut self, result: WorkflowResult<Payload>) -> Result<(), ReplayError> {
        let decision = match result {
            Ok(result) => {
                Decision::CompleteWorkflowExecution(CompleteWorkflowExecutionAttributes { result })
            }
            Err(WorkflowError::Fault(message)) => return Err(ReplayError::Fault(message)),
            Err(WorkflowError::Failed { reason, details }) => {
                Decision::FailWorkflowExecution(FailWorkflowExecutionAttributes { reason, details })
            }
            Err(WorkflowError::Canceled { details }) => {
                Decision::CancelWorkflowExecution(CancelWorkflowExecutionAttributes { details })
            }
            Err(WorkflowError::ContinueAsNew(attributes)) => {
                Decision::ContinueAsNewWorkflowExecution(*attributes)
            }
            Err(other) => Decision::FailWorkflowExecution(FailWorkflowExecutionAttributes {
                reason: other.kind().to_string(),
                details: other.to_string().into_bytes(),
            }),
        };
        debug!(
            run_id = %self.execution.run_id,
            decision = %decision,
            "Workflow returned"
        );
        self.env.lock().push_decision(decision);
        Ok(())
    }

    fn fold_checksum(&mut self, decisions: &[Decision]) -> Result<(), ReplayError> {
        let encoded = serde_json::to_vec(decisions).map_err(WeftError::from)?;
        let mut hasher = Sha256::new();
        hasher.update(self.decision_checksum.as_bytes());
        hasher.update(&encoded);
        self.decision_checksum = format!("{:x}", hasher.finalize());
        Ok(())
    }

    /// Match the batch's recorded decision events against outstanding decisions
    fn confirm_decisions(&mut self, batch: &DecisionBatch) -> Result<(), ReplayError> {
        for event in &batch.decision_events {
            match self.outstanding.pop_front() {
                None => {
                    return Err(NonDeterminismError::UnexpectedDecisionEvent {
                        event_id: event.event_id,
                        event: event_summary(event),
                    }
                    .into())
                }
                Some(decision) if !decision_matches_event(&decision, event) => {
                    return Err(NonDeterminismError::MismatchedDecision {
                        event_id: event.event_id,
                        decision: decision.summary(),
                        event: event_summary(event),
                    }
                    .into())
                }
                Some(_) => self.env.lock().on_decision_recorded(event),
            }
            self.last_event_id = event.event_id;
        }

        if batch.completed {
            if let Some(decision) = self.outstanding.front() {
                let event_id = batch
                    .decision_events
                    .last()
                    .map(|event| event.event_id)
                    .unwrap_or(self.last_event_id);
                return Err(NonDeterminismError::MissingDecisionEvent {
                    event_id,
                    decision: decision.summary(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Answer a query against the replayed state
    pub(crate) fn query(&self, query_type: &str, query_args: &[u8]) -> QueryResult {
        if query_type == STACK_TRACE_QUERY_TYPE {
            let trace = self.env.lock().stack_trace();
            return match serde_json::to_vec(&trace) {
                Ok(payload) => QueryResult::Answered(payload),
                Err(e) => QueryResult::Failed(e.to_string()),
            };
        }

        let Some(handler) = self.env.lock().query_handler(query_type) else {
            return QueryResult::Failed(format!("unknown query type: {}", query_type));
        };
        match catch_unwind(AssertUnwindSafe(|| handler(query_args))) {
            Ok(Ok(payload)) => QueryResult::Answered(payload),
            Ok(Err(message)) => QueryResult::Failed(message),
            Err(panic) => QueryResult::Failed(format!(
                "query handler panicked: {}",
                panic_message(panic)
            )),
        }
    }
}

impl std::fmt::Debug for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionState")
            .field("execution", &self.execution)
            .field("workflow_type", &self.workflow.metadata.kind)
            .field("last_event_id", &self.last_event_id)
            .field("outstanding", &self.outstanding.len())
            .field("completed", &self.completed)
            .finish()
    }
}
