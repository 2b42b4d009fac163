//! WorkflowTaskHandler - Processes decision and query tasks with deterministic replay

use crate::config::{NonDeterministicWorkflowPolicy, WorkerOptions};
use crate::error::{Result, WeftError};
use crate::telemetry::{query_task_span, workflow_task_span};
use crate::worker::cache::{shared_execution_cache, CachedExecution, ExecutionCache};
use crate::worker::execution::{ExecutionState, ReplayError};
use crate::worker::history::HistoryCursor;
use crate::worker::registry::{RegisteredWorkflow, WorkflowRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use weft_core::decision::FailWorkflowExecutionAttributes;
use weft_core::{
    Decision, DecisionTaskFailedCause, HistoryPageFetcher, QueryResult, StickyExecutionAttributes,
    WorkflowTask, WorkflowTaskResponse,
};

/// Failure reason of the fail-workflow decision sent under
/// `NonDeterministicWorkflowPolicy::FailWorkflow`
pub const NON_DETERMINISTIC_FAILURE_REASON: &str = "NonDeterministicWorkflowPolicyFailWorkflow";

/// Turns decision tasks into decisions by replaying workflow code against
/// history, and answers query tasks.
///
/// With sticky execution enabled the replay state of each run is kept in an
/// [`ExecutionCache`] between tasks, so a task only has to apply the events
/// the previous one did not see.
pub struct WorkflowTaskHandler {
    registry: Arc<WorkflowRegistry>,
    cache: Arc<ExecutionCache>,
    options: WorkerOptions,
}

impl WorkflowTaskHandler {
    /// Create a handler backed by the process-wide sticky cache
    pub fn new(registry: Arc<WorkflowRegistry>, options: WorkerOptions) -> Result<Self> {
        Self::with_cache(registry, shared_execution_cache(), options)
    }

    /// Create a handler with its own cache
    pub fn with_cache(
        registry: Arc<WorkflowRegistry>,
        cache: Arc<ExecutionCache>,
        options: WorkerOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            registry,
            cache,
            options,
        })
    }

    pub fn cache(&self) -> &Arc<ExecutionCache> {
        &self.cache
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Process one decision or query task.
    ///
    /// Errors are returned only when no response can be produced; the
    /// caller should let the task time out (or fail it) so the service
    /// retries with full history.
    pub async fn process_workflow_task(
        &self,
        task: WorkflowTask,
        history_fetcher: &dyn HistoryPageFetcher,
    ) -> Result<WorkflowTaskResponse> {
        if task.is_query() {
            let span = query_task_span(&task);
            self.process_query_task(task, history_fetcher)
                .instrument(span)
                .await
        } else {
            let span = workflow_task_span(&task);
            self.process_decision_task(task, history_fetcher)
                .instrument(span)
                .await
        }
    }

    fn lookup_workflow(&self, task: &WorkflowTask) -> Result<Arc<RegisteredWorkflow>> {
        self.registry
            .get(&task.workflow_type.name)
            .ok_or_else(|| WeftError::WorkflowNotRegistered(task.workflow_type.name.clone()))
    }

    fn new_state(&self, task: &WorkflowTask, workflow: &Arc<RegisteredWorkflow>) -> ExecutionState {
        ExecutionState::new(
            &self.options.domain,
            task.workflow_execution.clone(),
            Arc::clone(workflow),
        )
    }

    /// A fresh state needs the history from the very first event
    fn check_full_history(task: &WorkflowTask) -> Result<()> {
        match task.events.first().map(|event| event.event_id) {
            Some(1) => Ok(()),
            first => Err(WeftError::HistoryIncomplete {
                run_id: task.run_id().to_string(),
                first_event_id: first.unwrap_or(0),
            }),
        }
    }

    fn evict(&self, run_id: &str, reason: &str) {
        if self.cache.delete(run_id) {
            info!(run_id = %run_id, reason = %reason, "Evicted workflow execution from cache");
        }
    }

    async fn process_decision_task(
        &self,
        task: WorkflowTask,
        history_fetcher: &dyn HistoryPageFetcher,
    ) -> Result<WorkflowTaskResponse> {
        let workflow = self.lookup_workflow(&task)?;
        let run_id = task.run_id().to_string();
        let sticky = self.options.decision.sticky_execution;

        let handle: CachedExecution = if sticky {
            let (handle, created) = self
                .cache
                .get_or_insert_with(&run_id, || self.new_state(&task, &workflow));
            debug!(cache_hit = !created, "Looked up workflow execution");
            handle
        } else {
            Arc::new(tokio::sync::Mutex::new(self.new_state(&task, &workflow)))
        };
        let mut state = handle.lock().await;

        if state.last_event_id() > 0 && state.last_event_id() != task.previous_started_event_id {
            debug!(
                cached_event_id = state.last_event_id(),
                previous_started_event_id = task.previous_started_event_id,
                "Cached execution is stale, replaying from the start"
            );
            *state = self.new_state(&task, &workflow);
        }
        if state.last_event_id() == 0 {
            if let Err(e) = Self::check_full_history(&task) {
                self.evict(&run_id, "history incomplete");
                return Err(e);
            }
        }

        let WorkflowTask {
            task_token,
            events,
            next_page_token,
            started_event_id,
            ..
        } = task;
        let mut cursor = HistoryCursor::new(
            events,
            next_page_token,
            started_event_id,
            state.last_event_id(),
            history_fetcher,
        );

        match state.replay(&mut cursor).await {
            Ok(()) => {
                let completed = state.is_completed();
                let sticky_attributes = (sticky && !completed).then(|| StickyExecutionAttributes {
                    worker_task_list: self.options.sticky_task_list(),
                    schedule_to_start_timeout: self.options.decision.sticky_schedule_to_start_timeout,
                });
                let response = WorkflowTaskResponse::DecisionTaskCompleted {
                    task_token,
                    decisions: state.outstanding_decisions(),
                    identity: self.options.identity.clone(),
                    binary_checksum: self.options.binary_checksum.clone(),
                    decision_checksum: state.decision_checksum().to_string(),
                    sticky_attributes,
                };
                if completed {
                    info!(run_id = %run_id, "Workflow execution completed");
                    self.evict(&run_id, "workflow completed");
                }
                Ok(response)
            }
            Err(ReplayError::NonDeterminism(err)) => {
                warn!(
                    run_id = %run_id,
                    event_id = err.event_id(),
                    error = %err,
                    policy = ?self.options.decision.non_deterministic_workflow_policy,
                    "Non-deterministic workflow detected"
                );
                self.evict(&run_id, "non-deterministic workflow");
                match self.options.decision.non_deterministic_workflow_policy {
                    NonDeterministicWorkflowPolicy::BlockWorkflow => Err(err.into()),
                    NonDeterministicWorkflowPolicy::FailWorkflow => {
                        Ok(WorkflowTaskResponse::DecisionTaskCompleted {
                            task_token,
                            decisions: vec![Decision::FailWorkflowExecution(
                                FailWorkflowExecutionAttributes {
                                    reason: NON_DETERMINISTIC_FAILURE_REASON.to_string(),
                                    details: err.to_string().into_bytes(),
                                },
                            )],
                            identity: self.options.identity.clone(),
                            binary_checksum: self.options.binary_checksum.clone(),
                            decision_checksum: state.decision_checksum().to_string(),
                            sticky_attributes: None,
                        })
                    }
                }
            }
            Err(ReplayError::Fault(message)) => {
                warn!(run_id = %run_id, error = %message, "Workflow task failed");
                self.evict(&run_id, "workflow fault");
                Ok(WorkflowTaskResponse::DecisionTaskFailed {
                    task_token,
                    cause: DecisionTaskFailedCause::WorkflowWorkerUnhandledFailure,
                    details: message.into_bytes(),
                    identity: self.options.identity.clone(),
                    binary_checksum: self.options.binary_checksum.clone(),
                })
            }
            Err(ReplayError::Weft(err)) => {
                self.evict(&run_id, "replay error");
                Err(err)
            }
        }
    }

    /// Queries replay the full history into a state that is never cached
    async fn process_query_task(
        &self,
        task: WorkflowTask,
        history_fetcher: &dyn HistoryPageFetcher,
    ) -> Result<WorkflowTaskResponse> {
        let workflow = self.lookup_workflow(&task)?;
        Self::check_full_history(&task)?;
        let mut state = self.new_state(&task, &workflow);

        let WorkflowTask {
            task_token,
            events,
            next_page_token,
            started_event_id,
            query,
            ..
        } = task;
        let Some(query) = query else {
            return Err(WeftError::Other("query task without a query".to_string()));
        };
        let mut cursor =
            HistoryCursor::new(events, next_page_token, started_event_id, 0, history_fetcher);

        let result = match state.replay(&mut cursor).await {
            Ok(()) => state.query(&query.query_type, &query.query_args),
            Err(ReplayError::NonDeterminism(err)) => QueryResult::Failed(err.to_string()),
            Err(ReplayError::Fault(message)) => QueryResult::Failed(message),
            Err(ReplayError::Weft(err)) => return Err(err),
        };
        if let QueryResult::Failed(message) = &result {
            debug!(error = %message, "Query failed");
        }

        Ok(WorkflowTaskResponse::QueryTaskCompleted { task_token, result })
    }
}

impl std::fmt::Debug for WorkflowTaskHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowTaskHandler")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HistoryBuilder;
    use crate::workflow::context::WorkflowContextExt;
    use std::time::Duration;
    use weft_core::{NoMoreHistory, WorkflowExecution};

    fn handler(sticky: bool) -> WorkflowTaskHandler {
        let registry = WorkflowRegistry::new();
        registry
            .register_fn("sleepy", |ctx, _input| async move {
                ctx.sleep(Duration::from_secs(5)).await?;
                Ok(b"\"awake\"".to_vec())
            })
            .unwrap();
        registry
            .register_fn("faulty", |_ctx, _input| async move {
                Err(crate::error::WorkflowError::fault("storage unavailable"))
            })
            .unwrap();
        WorkflowTaskHandler::with_cache(
            Arc::new(registry),
            Arc::new(ExecutionCache::new(16)),
            WorkerOptions::new("default", "default-tl")
                .with_identity("test-worker")
                .with_binary_checksum("test-binary")
                .with_sticky_execution(sticky),
        )
        .unwrap()
    }

    fn execution() -> WorkflowExecution {
        WorkflowExecution::new("wf-1", "run-1")
    }

    #[tokio::test]
    async fn test_unregistered_workflow_type() {
        let handler = handler(true);
        let task = HistoryBuilder::new()
            .workflow_started("unknown", Vec::new())
            .decision_task()
            .workflow_task(execution());

        let result = handler.process_workflow_task(task, &NoMoreHistory).await;
        assert!(matches!(result, Err(WeftError::WorkflowNotRegistered(name)) if name == "unknown"));
    }

    #[tokio::test]
    async fn test_partial_history_without_cache_is_incomplete() {
        let handler = handler(true);
        let task = HistoryBuilder::new()
            .workflow_started("sleepy", Vec::new())
            .decision_task()
            .task_after(execution(), 1);

        let result = handler.process_workflow_task(task, &NoMoreHistory).await;
        assert!(matches!(
            result,
            Err(WeftError::HistoryIncomplete { first_event_id: 2, .. })
        ));
        assert_eq!(handler.cache().size(), 0);
    }

    #[tokio::test]
    async fn test_sticky_task_caches_state_and_sets_attributes() {
        let handler = handler(true);
        let task = HistoryBuilder::new()
            .workflow_started("sleepy", Vec::new())
            .decision_task()
            .workflow_task(execution());

        let response = handler
            .process_workflow_task(task, &NoMoreHistory)
            .await
            .unwrap();
        match response {
            WorkflowTaskResponse::DecisionTaskCompleted {
                decisions,
                identity,
                binary_checksum,
                sticky_attributes,
                ..
            } => {
                assert!(matches!(&decisions[..], [Decision::StartTimer(_)]));
                assert_eq!(identity, "test-worker");
                assert_eq!(binary_checksum, "test-binary");
                let sticky = sticky_attributes.unwrap();
                assert_eq!(sticky.worker_task_list.kind, weft_core::TaskListKind::Sticky);
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(handler.cache().size(), 1);
    }

    #[tokio::test]
    async fn test_non_sticky_task_is_not_cached() {
        let handler = handler(false);
        let task = HistoryBuilder::new()
            .workflow_started("sleepy", Vec::new())
            .decision_task()
            .workflow_task(execution());

        let response = handler
            .process_workflow_task(task, &NoMoreHistory)
            .await
            .unwrap();
        assert!(matches!(
            response,
            WorkflowTaskResponse::DecisionTaskCompleted {
                sticky_attributes: None,
                ..
            }
        ));
        assert_eq!(handler.cache().size(), 0);
    }

    #[tokio::test]
    async fn test_fault_fails_decision_task() {
        let handler = handler(true);
        let task = HistoryBuilder::new()
            .workflow_started("faulty", Vec::new())
            .decision_task()
            .workflow_task(execution());

        let response = handler
            .process_workflow_task(task, &NoMoreHistory)
            .await
            .unwrap();
        match response {
            WorkflowTaskResponse::DecisionTaskFailed { cause, details, .. } => {
                assert_eq!(cause, DecisionTaskFailedCause::WorkflowWorkerUnhandledFailure);
                assert_eq!(details, b"storage unavailable".to_vec());
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(handler.cache().size(), 0);
    }
}
