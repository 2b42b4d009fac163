//! Throttled heartbeat delivery for a running activity

use crate::error::ActivityError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weft_core::{
    is_service_transient_error, retry, ExponentialRetryPolicy, Payload,
    RecordActivityTaskHeartbeatRequest, WorkflowService,
};

#[derive(Default)]
struct HeartbeatState {
    last_sent: Option<Instant>,
    /// Details of the newest heartbeat that arrived inside the throttle window
    pending: Option<Option<Payload>>,
    flush: Option<JoinHandle<()>>,
}

struct InvokerInner {
    service: Arc<dyn WorkflowService>,
    task_token: Vec<u8>,
    identity: String,
    throttle_interval: Duration,
    retry_policy: ExponentialRetryPolicy,
    cancel: CancellationToken,
    state: Mutex<HeartbeatState>,
}

/// Sends heartbeats for one activity attempt.
///
/// The first heartbeat goes out immediately. Later heartbeats inside the
/// throttle interval are buffered, only the newest details are kept, and a
/// background task flushes them when the interval elapses. A cancellation
/// request from the service, or a service error saying the activity is gone,
/// cancels the activity's token.
#[derive(Clone)]
pub struct ServiceInvoker {
    inner: Arc<InvokerInner>,
}

impl ServiceInvoker {
    pub fn new(
        service: Arc<dyn WorkflowService>,
        task_token: Vec<u8>,
        identity: impl Into<String>,
        throttle_interval: Duration,
        retry_policy: ExponentialRetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(InvokerInner {
                service,
                task_token,
                identity: identity.into(),
                throttle_interval,
                retry_policy,
                cancel: CancellationToken::new(),
                state: Mutex::new(HeartbeatState::default()),
            }),
        }
    }

    /// Token cancelled when the activity must stop
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub fn throttle_interval(&self) -> Duration {
        self.inner.throttle_interval
    }

    /// Record a heartbeat, sending it now or buffering it for the next flush
    pub async fn heartbeat(&self, details: Option<Payload>) -> Result<(), ActivityError> {
        if self.inner.cancel.is_cancelled() {
            return Err(ActivityError::Canceled { details: None });
        }

        {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            if let Some(last_sent) = state.last_sent {
                let next_due = last_sent + self.inner.throttle_interval;
                if now < next_due {
                    state.pending = Some(details);
                    if state.flush.is_none() {
                        state.flush = Some(self.spawn_flush(next_due));
                    }
                    return Ok(());
                }
            }
            state.last_sent = Some(now);
        }

        self.inner.send(details).await
    }

    fn spawn_flush(&self, at: Instant) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => return,
                _ = tokio::time::sleep_until(at) => {}
            }

            let details = {
                let mut state = inner.state.lock();
                state.flush = None;
                state.last_sent = Some(Instant::now());
                state.pending.take()
            };

            if let Some(details) = details {
                if let Err(err) = inner.send(details).await {
                    debug!(error = %err, "Buffered heartbeat was not delivered");
                }
            }
        })
    }

    /// Stop the background flush; buffered details are dropped.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.pending = None;
        if let Some(flush) = state.flush.take() {
            flush.abort();
        }
    }
}

impl InvokerInner {
    async fn send(&self, details: Option<Payload>) -> Result<(), ActivityError> {
        let request = RecordActivityTaskHeartbeatRequest {
            task_token: self.task_token.clone(),
            details,
            identity: self.identity.clone(),
        };

        let result = retry(
            &self.cancel,
            &self.retry_policy,
            is_service_transient_error,
            || {
                let request = request.clone();
                async move { self.service.record_activity_task_heartbeat(request).await }
            },
        )
        .await;

        match result {
            Ok(response) if response.cancel_requested => {
                debug!("Cancellation requested for activity");
                self.cancel.cancel();
                Err(ActivityError::Canceled { details: None })
            }
            Ok(_) => Ok(()),
            Err(err) => {
                if err.is_terminal_for_activity() {
                    warn!(error = %err, "Activity no longer exists, cancelling");
                    self.cancel.cancel();
                }
                Err(ActivityError::Service(err))
            }
        }
    }
}

impl std::fmt::Debug for ServiceInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInvoker")
            .field("identity", &self.inner.identity)
            .field("throttle_interval", &self.inner.throttle_interval)
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWorkflowService;
    use weft_core::{RecordActivityTaskHeartbeatResponse, ServiceError};

    fn invoker(service: Arc<MockWorkflowService>) -> ServiceInvoker {
        let policy = ExponentialRetryPolicy {
            initial_interval: Duration::from_millis(10),
            maximum_attempts: Some(3),
            jitter: 0.0,
            ..ExponentialRetryPolicy::DEFAULT
        };
        ServiceInvoker::new(
            service,
            b"token".to_vec(),
            "worker-1",
            Duration::from_secs(8),
            policy,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_heartbeat_sent_immediately() {
        let service = Arc::new(MockWorkflowService::new());
        let invoker = invoker(service.clone());

        invoker.heartbeat(Some(b"1".to_vec())).await.unwrap();

        let requests = service.heartbeat_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].details, Some(b"1".to_vec()));
        assert_eq!(requests[0].identity, "worker-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_inside_window_are_coalesced() {
        let service = Arc::new(MockWorkflowService::new());
        let invoker = invoker(service.clone());

        invoker.heartbeat(Some(b"1".to_vec())).await.unwrap();
        invoker.heartbeat(Some(b"2".to_vec())).await.unwrap();
        invoker.heartbeat(Some(b"3".to_vec())).await.unwrap();
        assert_eq!(service.heartbeat_requests().len(), 1);

        tokio::time::sleep(Duration::from_secs(9)).await;

        let requests = service.heartbeat_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].details, Some(b"3".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drops_buffered_heartbeat() {
        let service = Arc::new(MockWorkflowService::new());
        let invoker = invoker(service.clone());

        invoker.heartbeat(None).await.unwrap();
        invoker.heartbeat(Some(b"late".to_vec())).await.unwrap();
        invoker.close();

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(service.heartbeat_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_requested_cancels_token() {
        let service = Arc::new(MockWorkflowService::new());
        service.push_heartbeat_response(Ok(RecordActivityTaskHeartbeatResponse {
            cancel_requested: true,
        }));
        let invoker = invoker(service.clone());
        let token = invoker.cancellation_token();

        let err = invoker.heartbeat(None).await.unwrap_err();
        assert!(matches!(err, ActivityError::Canceled { .. }));
        assert!(token.is_cancelled());

        // Later heartbeats fail without reaching the service
        let err = invoker.heartbeat(None).await.unwrap_err();
        assert!(matches!(err, ActivityError::Canceled { .. }));
        assert_eq!(service.heartbeat_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entity_not_exists_cancels_without_retry() {
        let service = Arc::new(MockWorkflowService::new());
        service.push_heartbeat_response(Err(ServiceError::EntityNotExists("gone".to_string())));
        let invoker = invoker(service.clone());

        let err = invoker.heartbeat(None).await.unwrap_err();
        assert!(matches!(
            err,
            ActivityError::Service(ServiceError::EntityNotExists(_))
        ));
        assert!(invoker.cancellation_token().is_cancelled());
        assert_eq!(service.heartbeat_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let service = Arc::new(MockWorkflowService::new());
        service.push_heartbeat_response(Err(ServiceError::ServiceBusy("busy".to_string())));
        service.push_heartbeat_response(Err(ServiceError::Transport("reset".to_string())));
        let invoker = invoker(service.clone());

        invoker.heartbeat(None).await.unwrap();
        assert_eq!(service.heartbeat_requests().len(), 3);
        assert!(!invoker.cancellation_token().is_cancelled());
    }
}
