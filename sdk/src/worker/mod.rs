//! Decision task processing: registry, sticky cache and replay engine

pub mod cache;
pub mod execution;
pub mod executor;
pub(crate) mod history;
pub mod registry;

pub use cache::{shared_execution_cache, CachedExecution, ExecutionCache};
pub use execution::ExecutionState;
pub use executor::{WorkflowTaskHandler, NON_DETERMINISTIC_FAILURE_REASON};
pub use registry::{BoxedWorkflowFn, RegisteredWorkflow, WorkflowMetadata, WorkflowRegistry};
