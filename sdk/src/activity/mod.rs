//! Activity definition, context, registry and task execution

pub mod context;
pub mod definition;
pub mod executor;
pub mod invoker;
pub mod registry;

pub use crate::error::ActivityError;
pub use context::{ActivityContext, ActivityContextExt, ActivityContextImpl, ActivityInfo};
pub use definition::{ActivityDefinition, DynamicActivity};
pub use executor::ActivityTaskHandler;
pub use invoker::ServiceInvoker;
pub use registry::{
    ActivityMetadata, ActivityRegistry, BoxedActivityFn, BoxedActivityFuture, RegisteredActivity,
};
