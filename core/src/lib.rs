//! # Weft Core
//!
//! Transport-independent building blocks of the weft workflow runtime.
//!
//! This crate defines what a workflow run looks like from the worker's side
//! (history events, decisions, tasks and responses), how a replayed decision
//! is checked against recorded history, and the retry primitives used for
//! every service call.
//!
//! ## What's in Core vs SDK
//!
//! **Core** contains:
//! - History events and their typed attributes
//! - Decisions and the decision/event matcher used for replay validation
//! - Workflow/activity task and response shapes
//! - Abstract service interfaces (history paging, heartbeats)
//! - Retry policies, the retry loop and the concurrent throttle
//!
//! **SDK** contains:
//! - Workflow and activity definitions, contexts and registries
//! - The decision task replay engine and its sticky execution cache
//! - The activity task executor and heartbeat invoker
//! - Testing utilities
//!
//! ## Modules
//!
//! - [`history`] - History event types
//! - [`decision`] - Decisions and the decision/event matcher
//! - [`task`] - Workflow/activity tasks and task responses
//! - [`service`] - Service traits and errors
//! - [`backoff`] - Retry policies and retry loops
//! - [`types`] - Identity and value types
//! - [`error`] - Core error types

pub mod backoff;
pub mod decision;
pub mod error;
pub mod history;
pub mod service;
pub mod task;
pub mod types;

// Re-export error types
pub use error::{CoreError, CoreResult, NonDeterminismError};

// Re-export history and decision types
pub use decision::{decision_matches_event, Decision, DecisionType};
pub use history::{DecisionTaskFailedCause, EventAttributes, EventType, HistoryEvent};

// Re-export task types
pub use task::{
    ActivityTask, QueryResult, StickyExecutionAttributes, WorkflowQuery, WorkflowTask,
    WorkflowTaskResponse,
};

// Re-export service types
pub use service::{
    is_service_transient_error, HistoryPage, HistoryPageFetcher, NoMoreHistory,
    RecordActivityTaskHeartbeatRequest, RecordActivityTaskHeartbeatResponse, ServiceError,
    WorkflowService,
};

// Re-export backoff types
pub use backoff::{retry, ConcurrentRetrier, ExponentialRetryPolicy, RetryPolicy};

pub use types::{
    ActivityType, Payload, SearchAttributes, TaskList, TaskListKind, TimeoutType,
    WorkflowExecution, WorkflowType,
};
