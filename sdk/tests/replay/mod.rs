//! Replay scenarios driven through `WorkflowTaskHandler`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weft_core::decision::Decision;
use tokio::sync::Notify;
use weft_core::{
    HistoryPage, HistoryPageFetcher, NoMoreHistory, QueryResult, ServiceError, WorkflowTaskResponse,
};
use weft_sdk::prelude::*;
use weft_sdk::testing::{HistoryBuilder, MockWorkflowService};
use weft_sdk::{ExecutionCache, NON_DETERMINISTIC_FAILURE_REASON};

static SIDE_EFFECT_CALLS: AtomicUsize = AtomicUsize::new(0);

async fn charge_order(ctx: Arc<dyn WorkflowContext>, _input: Payload) -> WorkflowResult<Payload> {
    ctx.on_query("state", || "waiting-activity-result");
    let receipt: String = ctx
        .execute_activity("charge", &"card", ActivityOptions::default())
        .await?;
    ctx.on_query("state", || "done");
    ctx.sleep(Duration::from_secs(30)).await?;
    Ok(serde_json::to_vec(&receipt)?)
}

async fn lucky_number(ctx: Arc<dyn WorkflowContext>, _input: Payload) -> WorkflowResult<Payload> {
    let number: u32 = ctx.side_effect(|| {
        SIDE_EFFECT_CALLS.fetch_add(1, Ordering::SeqCst);
        7
    })?;
    ctx.sleep(Duration::from_secs(10)).await?;
    Ok(serde_json::to_vec(&number)?)
}

async fn panics(_ctx: Arc<dyn WorkflowContext>, _input: Payload) -> WorkflowResult<Payload> {
    panic!("boom");
}

fn registry() -> Arc<WorkflowRegistry> {
    let registry = WorkflowRegistry::new();
    registry.register_fn("charge-order", charge_order).unwrap();
    registry.register_fn("lucky-number", lucky_number).unwrap();
    registry.register_fn("panics", panics).unwrap();
    Arc::new(registry)
}

fn handler_with(policy: NonDeterministicWorkflowPolicy, sticky: bool) -> WorkflowTaskHandler {
    WorkflowTaskHandler::with_cache(
        registry(),
        Arc::new(ExecutionCache::new(8)),
        WorkerOptions::new("default", "default-tl")
            .with_identity("replay-test")
            .with_sticky_execution(sticky)
            .with_non_deterministic_workflow_policy(policy),
    )
    .unwrap()
}

fn handler() -> WorkflowTaskHandler {
    handler_with(NonDeterministicWorkflowPolicy::BlockWorkflow, true)
}

fn execution() -> WorkflowExecution {
    WorkflowExecution::new("order-42", "run-42")
}

/// started, first round scheduling "charge", charge completed, open decision task
fn after_charge() -> HistoryBuilder {
    HistoryBuilder::new()
        .workflow_started("charge-order", Vec::new())
        .decision_round()
        .activity_scheduled("1", "charge", Vec::new())
        .activity_completed("1", b"\"receipt-1\"".to_vec())
        .decision_task()
}

fn decisions(response: &WorkflowTaskResponse) -> Vec<Decision> {
    response
        .decisions()
        .map(|decisions| decisions.to_vec())
        .unwrap_or_else(|| panic!("expected completed decision task, got {:?}", response))
}

fn checksum(response: &WorkflowTaskResponse) -> String {
    match response {
        WorkflowTaskResponse::DecisionTaskCompleted {
            decision_checksum, ..
        } => decision_checksum.clone(),
        other => panic!("expected completed decision task, got {:?}", other),
    }
}

fn query_answer(response: &WorkflowTaskResponse) -> String {
    match response.query_result() {
        Some(QueryResult::Answered(payload)) => serde_json::from_slice(payload).unwrap(),
        other => panic!("expected query answer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_replay_is_deterministic_across_workers() {
    let task = after_charge().workflow_task(execution());

    let first = handler()
        .process_workflow_task(task.clone(), &NoMoreHistory)
        .await
        .unwrap();
    let second = handler()
        .process_workflow_task(task, &NoMoreHistory)
        .await
        .unwrap();

    assert_eq!(decisions(&first), decisions(&second));
    assert_eq!(checksum(&first), checksum(&second));
    assert!(matches!(
        &decisions(&first)[..],
        [Decision::StartTimer(timer)] if timer.timer_id == "2"
    ));
}

#[tokio::test]
async fn test_sticky_continuation_matches_full_replay() {
    let handler = handler();

    let first = HistoryBuilder::new()
        .workflow_started("charge-order", Vec::new())
        .decision_task();
    let response = handler
        .process_workflow_task(first.workflow_task(execution()), &NoMoreHistory)
        .await
        .unwrap();
    assert!(matches!(
        &decisions(&response)[..],
        [Decision::ScheduleActivityTask(activity)] if activity.activity_id == "1"
    ));
    assert_eq!(handler.cache().size(), 1);

    let second = first
        .decision_task_completed()
        .activity_scheduled("1", "charge", Vec::new())
        .activity_completed("1", b"\"receipt-1\"".to_vec())
        .decision_task();
    let sticky_task = second.task_after(execution(), 3);
    assert_eq!(sticky_task.previous_started_event_id, 3);
    assert_eq!(sticky_task.events.first().map(|e| e.event_id), Some(4));

    let sticky = handler
        .process_workflow_task(sticky_task, &NoMoreHistory)
        .await
        .unwrap();
    let full = handler_with(NonDeterministicWorkflowPolicy::BlockWorkflow, false)
        .process_workflow_task(second.workflow_task(execution()), &NoMoreHistory)
        .await
        .unwrap();

    assert_eq!(decisions(&sticky), decisions(&full));
    assert_eq!(checksum(&sticky), checksum(&full));
    assert_eq!(handler.cache().size(), 1);
}

#[tokio::test]
async fn test_cache_released_after_completion() {
    let handler = handler();

    let first = after_charge();
    handler
        .process_workflow_task(first.workflow_task(execution()), &NoMoreHistory)
        .await
        .unwrap();
    assert_eq!(handler.cache().size(), 1);

    let last = first
        .decision_task_completed()
        .timer_started("2", Duration::from_secs(30))
        .timer_fired("2")
        .decision_task();
    let response = handler
        .process_workflow_task(last.task_after(execution(), 9), &NoMoreHistory)
        .await
        .unwrap();

    assert!(matches!(
        &decisions(&response)[..],
        [Decision::CompleteWorkflowExecution(complete)] if complete.result == b"\"receipt-1\"".to_vec()
    ));
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
async fn test_stale_cache_entry_is_replayed_from_start() {
    let handler = handler();
    let history = after_charge();
    handler
        .process_workflow_task(history.workflow_task(execution()), &NoMoreHistory)
        .await
        .unwrap();

    // The previous response was lost; the service retries with the full history
    let retried = history
        .decision_task_timed_out()
        .decision_task()
        .workflow_task(execution());
    let response = handler
        .process_workflow_task(retried, &NoMoreHistory)
        .await
        .unwrap();

    assert!(matches!(
        &decisions(&response)[..],
        [Decision::StartTimer(timer)] if timer.timer_id == "2"
    ));
}

#[tokio::test]
async fn test_block_policy_returns_error() {
    let handler = handler_with(NonDeterministicWorkflowPolicy::BlockWorkflow, true);
    let task = HistoryBuilder::new()
        .workflow_started("charge-order", Vec::new())
        .decision_round()
        .activity_scheduled("1", "refund", Vec::new())
        .decision_task()
        .workflow_task(execution());

    let result = handler.process_workflow_task(task, &NoMoreHistory).await;

    assert!(matches!(result, Err(WeftError::NonDeterminism(_))));
    assert_eq!(handler.cache().size(), 0);
}

#[tokio::test]
async fn test_fail_policy_fails_workflow() {
    let handler = handler_with(NonDeterministicWorkflowPolicy::FailWorkflow, true);
    let task = HistoryBuilder::new()
        .workflow_started("charge-order", Vec::new())
        .decision_round()
        .activity_scheduled("1", "refund", Vec::new())
        .decision_task()
        .workflow_task(execution());

    let response = handler
        .process_workflow_task(task, &NoMoreHistory)
        .await
        .unwrap();

    match &decisions(&response)[..] {
        [Decision::FailWorkflowExecution(fail)] => {
            assert_eq!(fail.reason, NON_DETERMINISTIC_FAILURE_REASON);
            assert!(String::from_utf8_lossy(&fail.details).contains("nondeterministic"));
        }
        other => panic!("unexpected decisions {:?}", other),
    }
    assert_eq!(handler.cache().size(), 0);
}

#[tokio::test]
async fn test_query_reflects_replayed_progress() {
    let handler = handler();

    let waiting = HistoryBuilder::new()
        .workflow_started("charge-order", Vec::new())
        .decision_round()
        .activity_scheduled("1", "charge", Vec::new());
    let response = handler
        .process_workflow_task(
            waiting.query_task(execution(), "state", Vec::new()),
            &NoMoreHistory,
        )
        .await
        .unwrap();
    assert_eq!(query_answer(&response), "waiting-activity-result");

    let done = waiting
        .activity_completed("1", b"\"receipt-1\"".to_vec())
        .decision_round()
        .timer_started("2", Duration::from_secs(30));
    let response = handler
        .process_workflow_task(
            done.query_task(execution(), "state", Vec::new()),
            &NoMoreHistory,
        )
        .await
        .unwrap();
    assert_eq!(query_answer(&response), "done");

    // Queries never populate the sticky cache
    assert_eq!(handler.cache().size(), 0);
}

#[tokio::test]
async fn test_unknown_query_type_fails_query() {
    let handler = handler();
    let task = after_charge().query_task(execution(), "no-such-query", Vec::new());

    let response = handler
        .process_workflow_task(task, &NoMoreHistory)
        .await
        .unwrap();

    assert!(matches!(
        response.query_result(),
        Some(QueryResult::Failed(_))
    ));
}

#[tokio::test]
async fn test_side_effect_not_rerun_on_replay() {
    let handler = handler();
    let calls_before = SIDE_EFFECT_CALLS.load(Ordering::SeqCst);

    let task = HistoryBuilder::new()
        .workflow_started("lucky-number", Vec::new())
        .decision_round()
        .side_effect_marker(1, b"7".to_vec())
        .timer_started("1", Duration::from_secs(10))
        .timer_fired("1")
        .decision_task()
        .workflow_task(execution());
    let response = handler
        .process_workflow_task(task, &NoMoreHistory)
        .await
        .unwrap();

    assert!(matches!(
        &decisions(&response)[..],
        [Decision::CompleteWorkflowExecution(complete)] if complete.result == b"7".to_vec()
    ));
    assert_eq!(SIDE_EFFECT_CALLS.load(Ordering::SeqCst), calls_before);
}

#[tokio::test]
async fn test_history_fetched_in_pages() {
    let history = after_charge();
    let mut task = history.workflow_task(execution());
    let rest = task.events.split_off(3);
    task.next_page_token = Some(b"page-2".to_vec());

    let service = MockWorkflowService::new();
    service.push_history_page(HistoryPage {
        events: rest,
        next_page_token: None,
    });

    let paged = handler()
        .process_workflow_task(task, &service)
        .await
        .unwrap();
    let full = handler()
        .process_workflow_task(history.workflow_task(execution()), &NoMoreHistory)
        .await
        .unwrap();

    assert_eq!(decisions(&paged), decisions(&full));
    assert_eq!(service.page_requests(), vec![b"page-2".to_vec()]);
}

/// Holds back the next history page until released
#[derive(Default)]
struct GatedHistory {
    page: Mutex<Option<HistoryPage>>,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl HistoryPageFetcher for GatedHistory {
    async fn fetch_next_page(
        &self,
        _next_page_token: &[u8],
    ) -> std::result::Result<HistoryPage, ServiceError> {
        self.entered.notify_one();
        self.release.notified().await;
        self.page
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ServiceError::EntityNotExists("no more history".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_same_run_tasks_are_processed_one_at_a_time() {
    let handler = handler();
    let started = HistoryBuilder::new()
        .workflow_started("charge-order", Vec::new())
        .decision_task();

    let mut first_task = started.workflow_task(execution());
    let rest = first_task.events.split_off(1);
    first_task.next_page_token = Some(b"page-2".to_vec());
    let gate = GatedHistory::default();
    *gate.page.lock().unwrap() = Some(HistoryPage {
        events: rest,
        next_page_token: None,
    });

    let sticky_task = started
        .decision_task_completed()
        .activity_scheduled("1", "charge", Vec::new())
        .activity_completed("1", b"\"receipt-1\"".to_vec())
        .decision_task()
        .task_after(execution(), 3);

    let first = handler.process_workflow_task(first_task, &gate);
    let second = handler.process_workflow_task(sticky_task, &NoMoreHistory);
    tokio::pin!(first);
    tokio::pin!(second);

    tokio::select! {
        biased;
        _ = gate.entered.notified() => {}
        response = &mut first => panic!("first task finished without paging: {:?}", response),
    }
    assert_eq!(handler.cache().size(), 1);

    let waited = tokio::time::timeout(Duration::from_secs(5), &mut second).await;
    assert!(waited.is_err(), "second task ran while the first held the run");

    gate.release.notify_one();
    let (first, second) = tokio::join!(first, second);

    assert!(matches!(
        &decisions(&first.unwrap())[..],
        [Decision::ScheduleActivityTask(activity)] if activity.activity_id == "1"
    ));
    assert!(matches!(
        &decisions(&second.unwrap())[..],
        [Decision::StartTimer(timer)] if timer.timer_id == "2"
    ));
    assert_eq!(handler.cache().size(), 1);
}

#[tokio::test]
async fn test_panicking_workflow_fails_decision_task() {
    let handler = handler();
    let task = HistoryBuilder::new()
        .workflow_started("panics", Vec::new())
        .decision_task()
        .workflow_task(execution());

    let response = handler
        .process_workflow_task(task, &NoMoreHistory)
        .await
        .unwrap();

    match response {
        WorkflowTaskResponse::DecisionTaskFailed { details, .. } => {
            assert!(String::from_utf8_lossy(&details).contains("boom"));
        }
        other => panic!("unexpected response {:?}", other),
    }
    assert_eq!(handler.cache().size(), 0);
}
