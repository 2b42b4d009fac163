//! Weft SDK for Rust
//!
//! Client-side runtime for durable workflows: replays workflow code against
//! recorded history to produce decisions, caches live runs between decision
//! tasks, and executes activities with deadlines and heartbeats.

#![allow(clippy::result_large_err)]

pub mod activity;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod worker;
pub mod workflow;

/// Testing utilities for workflows and activities.
/// Available only with the `testing` feature enabled.
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use error::{ActivityError, Result, WeftError, WorkflowError, WorkflowResult};

// Re-export config types
pub use config::{
    set_sticky_workflow_cache_size, sticky_workflow_cache_size, ActivityWorkerConfig,
    ConfigError, DecisionWorkerConfig, NonDeterministicWorkflowPolicy, WorkerOptions,
};

// Re-export workflow types
pub use workflow::{
    ActivityOptions, CancellableFuture, ChildWorkflowOptions, DynamicWorkflow, WorkflowContext,
    WorkflowContextExt, WorkflowContextImpl, WorkflowDefinition, WorkflowInfo,
};

// Re-export activity types
pub use activity::{
    ActivityContext, ActivityContextExt, ActivityDefinition, ActivityInfo, ActivityRegistry,
    ActivityTaskHandler, DynamicActivity,
};

// Re-export worker types
pub use worker::{
    shared_execution_cache, ExecutionCache, WorkflowRegistry, WorkflowTaskHandler,
    NON_DETERMINISTIC_FAILURE_REASON,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::activity::{
        ActivityContext, ActivityContextExt, ActivityDefinition, ActivityRegistry,
        ActivityTaskHandler, DynamicActivity,
    };
    pub use crate::config::{NonDeterministicWorkflowPolicy, WorkerOptions};
    pub use crate::error::{ActivityError, Result, WeftError, WorkflowError, WorkflowResult};
    pub use crate::worker::{WorkflowRegistry, WorkflowTaskHandler};
    pub use crate::workflow::{
        ActivityOptions, CancellableFuture, ChildWorkflowOptions, DynamicWorkflow,
        WorkflowContext, WorkflowContextExt, WorkflowDefinition,
    };
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value};
    pub use weft_core::{Payload, WorkflowExecution};
}
