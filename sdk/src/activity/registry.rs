//! ActivityRegistry - Registry for activity definitions

use crate::activity::context::ActivityContext;
use crate::activity::definition::ActivityDefinition;
use crate::config::ConfigError;
use crate::error::{ActivityError, Result, WeftError};
use crate::worker::registry::decode_input;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use weft_core::Payload;

/// Activity metadata extracted from an activity definition
#[derive(Debug, Clone)]
pub struct ActivityMetadata {
    /// Activity type name
    pub kind: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

pub type BoxedActivityFuture =
    Pin<Box<dyn Future<Output = std::result::Result<Payload, ActivityError>> + Send>>;

/// Type alias for boxed activity functions
pub type BoxedActivityFn =
    Box<dyn Fn(Arc<dyn ActivityContext>, Payload) -> BoxedActivityFuture + Send + Sync>;

/// A registered activity with its metadata and body
pub struct RegisteredActivity {
    pub metadata: ActivityMetadata,
    execute_fn: BoxedActivityFn,
}

impl RegisteredActivity {
    pub fn new(metadata: ActivityMetadata, execute_fn: BoxedActivityFn) -> Self {
        Self {
            metadata,
            execute_fn,
        }
    }

    pub fn execute(&self, ctx: Arc<dyn ActivityContext>, input: Payload) -> BoxedActivityFuture {
        (self.execute_fn)(ctx, input)
    }
}

impl std::fmt::Debug for RegisteredActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredActivity")
            .field("metadata", &self.metadata)
            .field("execute_fn", &"<fn>")
            .finish()
    }
}

/// Registry of activities a worker can run, keyed by activity type name
#[derive(Default)]
pub struct ActivityRegistry {
    activities: RwLock<HashMap<String, Arc<RegisteredActivity>>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity from its raw body.
    ///
    /// Registering the same type twice is a configuration error.
    pub fn register_raw(&self, activity: RegisteredActivity) -> Result<()> {
        let kind = activity.metadata.kind.clone();
        let mut activities = self.activities.write();

        if activities.contains_key(&kind) {
            return Err(WeftError::Config(ConfigError::InvalidValue(format!(
                "activity type '{}' is already registered",
                kind
            ))));
        }

        activities.insert(kind, Arc::new(activity));
        Ok(())
    }

    /// Register a typed activity definition
    pub fn register<A, I, O>(&self, activity: A) -> Result<()>
    where
        A: ActivityDefinition<Input = I, Output = O> + 'static,
        I: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        let metadata = ActivityMetadata {
            kind: activity.kind().to_string(),
            description: activity.description().map(|s| s.to_string()),
            tags: activity.tags(),
        };

        let activity = Arc::new(activity);
        let execute_fn: BoxedActivityFn = Box::new(move |ctx, input| {
            let activity = Arc::clone(&activity);
            Box::pin(async move {
                let typed_input: I = decode_input(&input).map_err(ActivityError::from)?;
                let output = activity.execute(typed_input, ctx.as_ref()).await?;
                serde_json::to_vec(&output).map_err(ActivityError::from)
            })
        });

        self.register_raw(RegisteredActivity::new(metadata, execute_fn))
    }

    /// Register an activity from a closure over raw payloads
    pub fn register_fn<F, Fut>(&self, kind: &str, execute_fn: F) -> Result<()>
    where
        F: Fn(Arc<dyn ActivityContext>, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Payload, ActivityError>> + Send + 'static,
    {
        let metadata = ActivityMetadata {
            kind: kind.to_string(),
            description: None,
            tags: vec![],
        };

        let boxed_fn: BoxedActivityFn =
            Box::new(move |ctx, input| Box::pin(execute_fn(ctx, input)));

        self.register_raw(RegisteredActivity::new(metadata, boxed_fn))
    }

    pub fn get(&self, kind: &str) -> Option<Arc<RegisteredActivity>> {
        self.activities.read().get(kind).cloned()
    }

    pub fn has(&self, kind: &str) -> bool {
        self.activities.read().contains_key(kind)
    }

    pub fn get_registered_kinds(&self) -> Vec<String> {
        self.activities.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.activities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.read().is_empty()
    }
}

impl std::fmt::Debug for ActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRegistry")
            .field("activities", &self.get_registered_kinds())
            .finish()
    }
}
