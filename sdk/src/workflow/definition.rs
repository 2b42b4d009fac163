//! WorkflowDefinition trait

use crate::error::WorkflowResult;
use crate::workflow::context::WorkflowContext;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Definition of a workflow with typed input and output.
///
/// Input is decoded from, and output encoded to, JSON payloads.
#[async_trait]
pub trait WorkflowDefinition: Send + Sync {
    /// Input type for the workflow
    type Input: Serialize + DeserializeOwned + Send;
    /// Output type for the workflow
    type Output: Serialize + DeserializeOwned + Send;

    /// Workflow type name this definition is registered under
    fn kind(&self) -> &str;

    /// Execute the workflow with the given context and input.
    ///
    /// Must be deterministic: the same history has to produce the same
    /// sequence of context calls every time.
    async fn execute(
        &self,
        ctx: &dyn WorkflowContext,
        input: Self::Input,
    ) -> WorkflowResult<Self::Output>;

    /// Optional description of the workflow
    fn description(&self) -> Option<&str> {
        None
    }

    /// Tags for categorizing the workflow
    fn tags(&self) -> Vec<String> {
        vec![]
    }
}

/// Helper trait for implementing dynamic (untyped) workflows.
#[async_trait]
pub trait DynamicWorkflow: Send + Sync {
    fn kind(&self) -> &str;

    /// Execute the workflow with dynamic input/output
    async fn execute(&self, ctx: &dyn WorkflowContext, input: Value) -> WorkflowResult<Value>;

    fn description(&self) -> Option<&str> {
        None
    }

    fn tags(&self) -> Vec<String> {
        vec![]
    }
}

// Implement WorkflowDefinition for any DynamicWorkflow
#[async_trait]
impl<T: DynamicWorkflow> WorkflowDefinition for T {
    type Input = Value;
    type Output = Value;

    fn kind(&self) -> &str {
        DynamicWorkflow::kind(self)
    }

    async fn execute(
        &self,
        ctx: &dyn WorkflowContext,
        input: Self::Input,
    ) -> WorkflowResult<Self::Output> {
        DynamicWorkflow::execute(self, ctx, input).await
    }

    fn description(&self) -> Option<&str> {
        DynamicWorkflow::description(self)
    }

    fn tags(&self) -> Vec<String> {
        DynamicWorkflow::tags(self)
    }
}
