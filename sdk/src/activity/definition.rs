//! ActivityDefinition trait

use crate::activity::context::ActivityContext;
use crate::error::ActivityError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Definition of an activity with typed input and output.
///
/// Activities run outside of replay and may perform arbitrary I/O. Input is
/// decoded from, and output encoded to, JSON payloads.
#[async_trait]
pub trait ActivityDefinition: Send + Sync {
    /// Input type for the activity
    type Input: Serialize + DeserializeOwned + Send;
    /// Output type for the activity
    type Output: Serialize + DeserializeOwned + Send;

    /// Activity type name this definition is registered under
    fn kind(&self) -> &str;

    /// Execute the activity with the given input and context.
    ///
    /// Long-running bodies should watch `ctx.cancellation_token()`: it fires
    /// at the attempt deadline and when the service requests cancellation.
    async fn execute(
        &self,
        input: Self::Input,
        ctx: &dyn ActivityContext,
    ) -> Result<Self::Output, ActivityError>;

    /// Optional description of the activity
    fn description(&self) -> Option<&str> {
        None
    }

    /// Tags for categorizing the activity
    fn tags(&self) -> Vec<String> {
        vec![]
    }
}

/// Helper trait for implementing dynamic (untyped) activities
#[async_trait]
pub trait DynamicActivity: Send + Sync {
    fn kind(&self) -> &str;

    async fn execute(&self, input: Value, ctx: &dyn ActivityContext)
        -> Result<Value, ActivityError>;

    fn description(&self) -> Option<&str> {
        None
    }

    fn tags(&self) -> Vec<String> {
        vec![]
    }
}

#[async_trait]
impl<T: DynamicActivity> ActivityDefinition for T {
    type Input = Value;
    type Output = Value;

    fn kind(&self) -> &str {
        DynamicActivity::kind(self)
    }

    async fn execute(
        &self,
        input: Self::Input,
        ctx: &dyn ActivityContext,
    ) -> Result<Self::Output, ActivityError> {
        DynamicActivity::execute(self, input, ctx).await
    }

    fn description(&self) -> Option<&str> {
        DynamicActivity::description(self)
    }

    fn tags(&self) -> Vec<String> {
        DynamicActivity::tags(self)
    }
}
