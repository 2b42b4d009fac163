//! WorkflowRegistry - Registry for workflow definitions

use crate::config::ConfigError;
use crate::error::{Result, WeftError, WorkflowError, WorkflowResult};
use crate::workflow::context::WorkflowContext;
use crate::workflow::definition::WorkflowDefinition;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use weft_core::Payload;

/// Workflow metadata extracted from a workflow definition
#[derive(Debug, Clone)]
pub struct WorkflowMetadata {
    /// Workflow type name
    pub kind: String,
    pub description: Option<String>,
    /// Tags for categorization
    pub tags: Vec<String>,
}

/// Suspended workflow computation, driven by the replay engine
pub type WorkflowFuture = Pin<Box<dyn Future<Output = WorkflowResult<Payload>> + Send>>;

/// Type alias for boxed workflow start functions
pub type BoxedWorkflowFn =
    Box<dyn Fn(Arc<dyn WorkflowContext>, Payload) -> WorkflowFuture + Send + Sync>;

/// A registered workflow with its metadata and start function
pub struct RegisteredWorkflow {
    pub metadata: WorkflowMetadata,
    start_fn: BoxedWorkflowFn,
}

impl RegisteredWorkflow {
    pub fn new(metadata: WorkflowMetadata, start_fn: BoxedWorkflowFn) -> Self {
        Self { metadata, start_fn }
    }

    /// Create the workflow computation for one run.
    ///
    /// Nothing runs until the returned future is polled.
    pub fn start(&self, ctx: Arc<dyn WorkflowContext>, input: Payload) -> WorkflowFuture {
        (self.start_fn)(ctx, input)
    }
}

impl std::fmt::Debug for RegisteredWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredWorkflow")
            .field("metadata", &self.metadata)
            .field("start_fn", &"<fn>")
            .finish()
    }
}

/// Decode a workflow input payload; an empty payload decodes as JSON `null`.
pub(crate) fn decode_input<I: DeserializeOwned>(input: &[u8]) -> serde_json::Result<I> {
    if input.is_empty() {
        serde_json::from_slice(b"null")
    } else {
        serde_json::from_slice(input)
    }
}

/// Registry of workflows a worker can replay, keyed by workflow type name
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<RegisteredWorkflow>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow from its raw start function.
    ///
    /// Registering the same type twice is a configuration error.
    pub fn register_raw(&self, workflow: RegisteredWorkflow) -> Result<()> {
        let kind = workflow.metadata.kind.clone();
        let mut workflows = self.workflows.write();

        if workflows.contains_key(&kind) {
            return Err(WeftError::Config(ConfigError::InvalidValue(format!(
                "workflow type '{}' is already registered",
                kind
            ))));
        }

        workflows.insert(kind, Arc::new(workflow));
        Ok(())
    }

    /// Register a typed workflow definition.
    ///
    /// The input is decoded from JSON before the workflow body runs; a
    /// payload that does not decode fails the workflow.
    pub fn register<W, I, O>(&self, workflow: W) -> Result<()>
    where
        W: WorkflowDefinition<Input = I, Output = O> + 'static,
        I: Serialize + DeserializeOwned + Send + 'static,
        O: Serialize + DeserializeOwned + Send + 'static,
    {
        let metadata = WorkflowMetadata {
            kind: workflow.kind().to_string(),
            description: workflow.description().map(|s| s.to_string()),
            tags: workflow.tags(),
        };

        let workflow = Arc::new(workflow);
        let start_fn: BoxedWorkflowFn = Box::new(move |ctx, input| {
            let workflow = Arc::clone(&workflow);
            Box::pin(async move {
                let typed_input: I = decode_input(&input).map_err(WorkflowError::from)?;
                let output = workflow.execute(ctx.as_ref(), typed_input).await?;
                serde_json::to_vec(&output).map_err(WorkflowError::from)
            })
        });

        self.register_raw(RegisteredWorkflow::new(metadata, start_fn))
    }

    /// Register a workflow from a closure over raw payloads
    pub fn register_fn<F, Fut>(&self, kind: &str, start_fn: F) -> Result<()>
    where
        F: Fn(Arc<dyn WorkflowContext>, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = WorkflowResult<Payload>> + Send + 'static,
    {
        let metadata = WorkflowMetadata {
            kind: kind.to_string(),
            description: None,
            tags: vec![],
        };

        let boxed_fn: BoxedWorkflowFn = Box::new(move |ctx, input| Box::pin(start_fn(ctx, input)));

        self.register_raw(RegisteredWorkflow::new(metadata, boxed_fn))
    }

    /// Get a registered workflow by type name
    pub fn get(&self, kind: &str) -> Option<Arc<RegisteredWorkflow>> {
        self.workflows.read().get(kind).cloned()
    }

    pub fn has(&self, kind: &str) -> bool {
        self.workflows.read().contains_key(kind)
    }

    /// Get all registered workflow type names
    pub fn get_registered_kinds(&self) -> Vec<String> {
        self.workflows.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<_> = self.get_registered_kinds();
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &kinds)
            .finish()
    }
}
