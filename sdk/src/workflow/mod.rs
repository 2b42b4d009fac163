//! Workflow definition, context and futures

pub mod context;
pub mod context_impl;
pub mod definition;
pub(crate) mod env;
pub mod future;

pub use crate::error::{WorkflowError, WorkflowResult};
pub use context::{
    ActivityOptions, ChildWorkflowOptions, QueryHandler, WorkflowContext, WorkflowContextExt,
    WorkflowInfo, DEFAULT_VERSION, STACK_TRACE_QUERY_TYPE,
};
pub use context_impl::WorkflowContextImpl;
pub use definition::{DynamicWorkflow, WorkflowDefinition};
pub use future::{
    ActivityFuture, CancellableFuture, ChildWorkflowFuture, ExternalWorkflowFuture,
    SignalChannel, SignalFuture, TimerFuture,
};
