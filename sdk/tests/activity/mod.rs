//! Activity execution through `ActivityTaskHandler`

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weft_core::{ActivityTask, ActivityType};
use weft_sdk::prelude::*;
use weft_sdk::testing::{MockActivityContext, MockWorkflowService};

type ActivityResult = std::result::Result<Payload, ActivityError>;

fn task(activity_type: &str) -> ActivityTask {
    let now = Utc::now();
    ActivityTask {
        task_token: format!("token-{}", activity_type).into_bytes(),
        workflow_execution: WorkflowExecution::new("import-1", "run-1"),
        activity_id: "1".to_string(),
        activity_type: ActivityType::new(activity_type),
        input: Vec::new(),
        scheduled_timestamp: now,
        started_timestamp: now,
        schedule_to_close_timeout: Duration::from_secs(3600),
        start_to_close_timeout: Duration::from_secs(60),
        heartbeat_timeout: Duration::from_secs(10),
        heartbeat_details: None,
        attempt: 0,
    }
}

fn handler(registry: ActivityRegistry) -> (Arc<ActivityTaskHandler>, Arc<MockWorkflowService>) {
    let service = Arc::new(MockWorkflowService::new());
    let handler = ActivityTaskHandler::new(
        Arc::new(registry),
        service.clone(),
        WorkerOptions::new("default", "imports").with_identity("activity-test"),
    )
    .unwrap();
    (Arc::new(handler), service)
}

/// Imports rows in pages, heartbeating the next page after each one
struct ImportRows;

#[async_trait]
impl ActivityDefinition for ImportRows {
    type Input = u32;
    type Output = u32;

    fn kind(&self) -> &str {
        "import-rows"
    }

    async fn execute(
        &self,
        pages: u32,
        ctx: &dyn ActivityContext,
    ) -> std::result::Result<u32, ActivityError> {
        let start = ctx.heartbeat_details_as::<u32>()?.unwrap_or(0);
        let mut imported = 0;
        for page in start..pages {
            ctx.check_cancellation()?;
            imported += 1;
            ctx.heartbeat_with(&(page + 1)).await?;
        }
        Ok(imported)
    }
}

async fn wait_for_cancel(ctx: Arc<dyn ActivityContext>, _input: Payload) -> ActivityResult {
    ctx.cancellation_token().cancelled().await;
    Err(ActivityError::Canceled { details: None })
}

async fn hang(_ctx: Arc<dyn ActivityContext>, _input: Payload) -> ActivityResult {
    std::future::pending::<()>().await;
    Ok(Vec::new())
}

async fn stop_aware(ctx: Arc<dyn ActivityContext>, _input: Payload) -> ActivityResult {
    let stop = ctx.worker_stop_token();
    tokio::select! {
        _ = stop.cancelled() => Ok(b"\"stopped early\"".to_vec()),
        _ = tokio::time::sleep(Duration::from_secs(50)) => Ok(b"\"finished\"".to_vec()),
    }
}

async fn heartbeat_until_canceled(ctx: Arc<dyn ActivityContext>, _input: Payload) -> ActivityResult {
    loop {
        ctx.record_heartbeat(None).await?;
        tokio::time::sleep(Duration::from_secs(9)).await;
    }
}

async fn chatty(ctx: Arc<dyn ActivityContext>, _input: Payload) -> ActivityResult {
    for step in 1..=3u32 {
        ctx.heartbeat_with(&step).await?;
    }
    tokio::time::sleep(Duration::from_secs(9)).await;
    Ok(Vec::new())
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_context() {
    let seen_token: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));
    let registry = ActivityRegistry::new();
    let slot = seen_token.clone();
    registry
        .register_fn("hangs", move |ctx, input| {
            *slot.lock().unwrap() = Some(ctx.cancellation_token());
            hang(ctx, input)
        })
        .unwrap();
    let (handler, _) = handler(registry);

    let err = handler.execute("imports", &task("hangs")).await.unwrap_err();

    assert_eq!(err, ActivityError::DeadlineExceeded);
    let token = seen_token.lock().unwrap().clone().unwrap();
    assert!(token.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn test_worker_stop_is_cooperative() {
    let registry = ActivityRegistry::new();
    registry.register_fn("stop-aware", stop_aware).unwrap();
    let (handler, _) = handler(registry);

    let running = {
        let handler = handler.clone();
        tokio::spawn(async move { handler.execute("imports", &task("stop-aware")).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    handler.stop();

    let result = running.await.unwrap().unwrap();
    assert_eq!(result, b"\"stopped early\"".to_vec());
}

#[tokio::test(start_paused = true)]
async fn test_body_observing_cancel_token_sees_deadline() {
    let registry = ActivityRegistry::new();
    registry.register_fn("waits", wait_for_cancel).unwrap();
    let (handler, _) = handler(registry);

    let err = handler.execute("imports", &task("waits")).await.unwrap_err();
    assert_eq!(err, ActivityError::DeadlineExceeded);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_request_stops_heartbeating_activity() {
    let registry = ActivityRegistry::new();
    registry
        .register_fn("heartbeats", heartbeat_until_canceled)
        .unwrap();
    let (handler, service) = handler(registry);
    service.push_heartbeat_response(Ok(Default::default()));
    service.request_cancel();

    let err = handler
        .execute("imports", &task("heartbeats"))
        .await
        .unwrap_err();

    assert!(matches!(err, ActivityError::Canceled { .. }));
    assert_eq!(service.heartbeat_requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_throttled_to_timeout_fraction() {
    let registry = ActivityRegistry::new();
    registry.register_fn("chatty", chatty).unwrap();
    let (handler, service) = handler(registry);

    handler.execute("imports", &task("chatty")).await.unwrap();

    let requests = service.heartbeat_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].details, Some(b"1".to_vec()));
    assert_eq!(requests[1].details, Some(b"3".to_vec()));
    assert!(requests
        .iter()
        .all(|request| request.identity == "activity-test"));
}

#[tokio::test]
async fn test_typed_activity_resumes_from_heartbeat_details() {
    let registry = ActivityRegistry::new();
    registry.register(ImportRows).unwrap();
    let (handler, _) = handler(registry);

    let mut task = task("import-rows");
    task.input = b"5".to_vec();
    task.heartbeat_details = Some(b"3".to_vec());

    let result = handler.execute("imports", &task).await.unwrap();
    assert_eq!(result, b"2".to_vec());
}

#[tokio::test]
async fn test_typed_activity_with_mock_context() {
    let ctx = MockActivityContext::builder()
        .activity_type("import-rows")
        .build();

    let imported = ImportRows.execute(3, &ctx).await.unwrap();

    assert_eq!(imported, 3);
    assert_eq!(ctx.last_heartbeat(), Some(Some(b"3".to_vec())));
}

#[tokio::test]
async fn test_typed_activity_stops_when_canceled() {
    let ctx = MockActivityContext::new();
    ctx.cancel_on_next_heartbeat();

    let err = ImportRows.execute(10, &ctx).await.unwrap_err();

    assert!(matches!(err, ActivityError::Canceled { .. }));
    assert_eq!(ctx.heartbeats().len(), 1);
}
