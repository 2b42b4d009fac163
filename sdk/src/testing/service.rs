//! Scripted in-memory orchestration service

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use weft_core::{
    HistoryPage, HistoryPageFetcher, RecordActivityTaskHeartbeatRequest,
    RecordActivityTaskHeartbeatResponse, ServiceError, WorkflowService,
};

/// In-memory [`WorkflowService`] and [`HistoryPageFetcher`].
///
/// Heartbeat responses are taken from a script in order; once the script
/// runs out every heartbeat succeeds. History pages are served in the order
/// they were added, whatever token is passed.
#[derive(Debug, Default)]
pub struct MockWorkflowService {
    heartbeat_responses: Mutex<VecDeque<Result<RecordActivityTaskHeartbeatResponse, ServiceError>>>,
    heartbeat_requests: Mutex<Vec<RecordActivityTaskHeartbeatRequest>>,
    history_pages: Mutex<VecDeque<HistoryPage>>,
    page_requests: Mutex<Vec<Vec<u8>>>,
}

impl MockWorkflowService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unscripted heartbeat call
    pub fn push_heartbeat_response(
        &self,
        response: Result<RecordActivityTaskHeartbeatResponse, ServiceError>,
    ) {
        self.heartbeat_responses.lock().push_back(response);
    }

    /// Answer the next heartbeat with a cancellation request
    pub fn request_cancel(&self) {
        self.push_heartbeat_response(Ok(RecordActivityTaskHeartbeatResponse {
            cancel_requested: true,
        }));
    }

    /// Every heartbeat request received so far
    pub fn heartbeat_requests(&self) -> Vec<RecordActivityTaskHeartbeatRequest> {
        self.heartbeat_requests.lock().clone()
    }

    pub fn push_history_page(&self, page: HistoryPage) {
        self.history_pages.lock().push_back(page);
    }

    /// Tokens of every history page request received so far
    pub fn page_requests(&self) -> Vec<Vec<u8>> {
        self.page_requests.lock().clone()
    }
}

#[async_trait]
impl WorkflowService for MockWorkflowService {
    async fn record_activity_task_heartbeat(
        &self,
        request: RecordActivityTaskHeartbeatRequest,
    ) -> Result<RecordActivityTaskHeartbeatResponse, ServiceError> {
        self.heartbeat_requests.lock().push(request);
        self.heartbeat_responses
            .lock()
            .pop_front()
            .unwrap_or(Ok(RecordActivityTaskHeartbeatResponse::default()))
    }
}

#[async_trait]
impl HistoryPageFetcher for MockWorkflowService {
    async fn fetch_next_page(&self, next_page_token: &[u8]) -> Result<HistoryPage, ServiceError> {
        self.page_requests.lock().push(next_page_token.to_vec());
        self.history_pages
            .lock()
            .pop_front()
            .ok_or_else(|| ServiceError::EntityNotExists("no more history pages".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_heartbeats_then_default() {
        let service = MockWorkflowService::new();
        service.push_heartbeat_response(Err(ServiceError::ServiceBusy("busy".to_string())));
        service.request_cancel();

        let request = RecordActivityTaskHeartbeatRequest {
            task_token: b"t".to_vec(),
            details: None,
            identity: "me".to_string(),
        };

        assert!(service
            .record_activity_task_heartbeat(request.clone())
            .await
            .is_err());
        assert!(
            service
                .record_activity_task_heartbeat(request.clone())
                .await
                .unwrap()
                .cancel_requested
        );
        assert!(
            !service
                .record_activity_task_heartbeat(request)
                .await
                .unwrap()
                .cancel_requested
        );
        assert_eq!(service.heartbeat_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_history_pages_served_in_order() {
        let service = MockWorkflowService::new();
        service.push_history_page(HistoryPage {
            events: Vec::new(),
            next_page_token: Some(b"2".to_vec()),
        });

        let page = service.fetch_next_page(b"1").await.unwrap();
        assert_eq!(page.next_page_token, Some(b"2".to_vec()));
        assert!(service.fetch_next_page(b"2").await.is_err());
        assert_eq!(service.page_requests(), vec![b"1".to_vec(), b"2".to_vec()]);
    }
}
