//! Abstract orchestration service interfaces
//!
//! The wire transport is not part of this crate. Workers talk to the service
//! through these traits, and tests script them with in-memory doubles.

use crate::history::HistoryEvent;
use crate::types::Payload;
use async_trait::async_trait;

/// Failure of a call to the orchestration service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Target workflow, activity or task no longer exists
    #[error("Entity not exists: {0}")]
    EntityNotExists(String),

    /// Domain is not active in this cluster
    #[error("Domain not active: {0}")]
    DomainNotActive(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal service error: {0}")]
    InternalService(String),

    /// Service is shedding load
    #[error("Service busy: {0}")]
    ServiceBusy(String),

    /// Call exceeded its own deadline
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Call was cancelled by the caller
    #[error("Canceled")]
    Canceled,

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ServiceError {
    /// Whether the activity or workflow behind the call is gone for good.
    pub fn is_terminal_for_activity(&self) -> bool {
        matches!(self, Self::EntityNotExists(_) | Self::DomainNotActive(_))
    }
}

/// Whether a failed service call is worth retrying.
///
/// Bad requests, missing entities, inactive domains and caller cancellation
/// will fail the same way on every attempt.
pub fn is_service_transient_error(err: &ServiceError) -> bool {
    match err {
        ServiceError::BadRequest(_)
        | ServiceError::EntityNotExists(_)
        | ServiceError::DomainNotActive(_)
        | ServiceError::Canceled => false,
        ServiceError::InternalService(_)
        | ServiceError::ServiceBusy(_)
        | ServiceError::DeadlineExceeded
        | ServiceError::Transport(_) => true,
    }
}

/// One page of history returned by the service
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub events: Vec<HistoryEvent>,
    pub next_page_token: Option<Vec<u8>>,
}

/// Lazily fetches the rest of a decision task's history.
#[async_trait]
pub trait HistoryPageFetcher: Send + Sync {
    async fn fetch_next_page(&self, next_page_token: &[u8]) -> Result<HistoryPage, ServiceError>;
}

/// Fetcher for tasks that always carry their full history
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMoreHistory;

#[async_trait]
impl HistoryPageFetcher for NoMoreHistory {
    async fn fetch_next_page(&self, _next_page_token: &[u8]) -> Result<HistoryPage, ServiceError> {
        Err(ServiceError::BadRequest(
            "history paging is not available for this task".to_string(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordActivityTaskHeartbeatRequest {
    pub task_token: Vec<u8>,
    pub details: Option<Payload>,
    pub identity: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordActivityTaskHeartbeatResponse {
    pub cancel_requested: bool,
}

/// Service calls made on behalf of running activities
#[async_trait]
pub trait WorkflowService: Send + Sync {
    async fn record_activity_task_heartbeat(
        &self,
        request: RecordActivityTaskHeartbeatRequest,
    ) -> Result<RecordActivityTaskHeartbeatResponse, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(is_service_transient_error(&ServiceError::ServiceBusy(
            "slow down".to_string()
        )));
        assert!(is_service_transient_error(&ServiceError::DeadlineExceeded));
        assert!(is_service_transient_error(&ServiceError::Transport(
            "reset".to_string()
        )));
        assert!(!is_service_transient_error(&ServiceError::EntityNotExists(
            "activity".to_string()
        )));
        assert!(!is_service_transient_error(&ServiceError::BadRequest(
            "bad".to_string()
        )));
        assert!(!is_service_transient_error(&ServiceError::Canceled));
    }

    #[test]
    fn test_terminal_for_activity() {
        assert!(ServiceError::EntityNotExists("x".to_string()).is_terminal_for_activity());
        assert!(ServiceError::DomainNotActive("x".to_string()).is_terminal_for_activity());
        assert!(!ServiceError::ServiceBusy("x".to_string()).is_terminal_for_activity());
    }

    #[tokio::test]
    async fn test_no_more_history_refuses_paging() {
        let result = NoMoreHistory.fetch_next_page(b"token").await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }
}
