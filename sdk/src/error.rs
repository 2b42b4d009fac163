//! Error types for the weft SDK

// Re-export core error types
pub use weft_core::{CoreError, NonDeterminismError, ServiceError};

use crate::config::ConfigError;
use weft_core::decision::ContinueAsNewWorkflowExecutionAttributes;
use weft_core::{Payload, TimeoutType};

/// Main error type for the weft SDK.
///
/// Returned by the task handlers only for conditions where no well-formed
/// response can be produced.
#[derive(Debug, thiserror::Error)]
pub enum WeftError {
    /// Replayed workflow code diverged from history under `BlockWorkflow`
    #[error("{0}")]
    NonDeterminism(#[from] NonDeterminismError),

    /// Workflow definition not found
    #[error("Workflow not registered: {0}")]
    WorkflowNotRegistered(String),

    /// Task history does not start at the first event and no cached state exists
    #[error("History incomplete for run {run_id}: first event id is {first_event_id}")]
    HistoryIncomplete { run_id: String, first_event_id: i64 },

    /// History has gaps, regressions or is missing its start event
    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    /// Service call failed
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for weft SDK operations
pub type Result<T> = std::result::Result<T, WeftError>;

impl From<CoreError> for WeftError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Serialization(e) => WeftError::Serialization(e),
            CoreError::InvalidHistory(msg) => WeftError::InvalidHistory(msg),
            CoreError::InvalidConfiguration(msg) => {
                WeftError::Config(ConfigError::InvalidValue(msg))
            }
            CoreError::Other(msg) => WeftError::Other(msg),
        }
    }
}

/// Outcome of workflow code, and of the futures it awaits.
///
/// Returning one of these from a workflow closes the run: `Failed` and every
/// future-level error become a fail-workflow decision, `Canceled` a
/// cancel-workflow decision and `ContinueAsNew` a continue-as-new decision.
/// `Fault` fails the decision task instead, leaving the run open.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    /// Deliberate failure raised by workflow code
    #[error("Workflow failed: {reason}")]
    Failed { reason: String, details: Payload },

    /// Workflow accepted a cancellation request
    #[error("Workflow canceled")]
    Canceled { details: Payload },

    /// Restart the workflow as a new run
    #[error("Continue as new: {}", .0.workflow_type.name)]
    ContinueAsNew(Box<ContinueAsNewWorkflowExecutionAttributes>),

    #[error("Activity {activity_id} failed: {reason}")]
    ActivityFailed {
        activity_id: String,
        reason: String,
        details: Payload,
    },

    #[error("Activity {activity_id} timed out ({timeout_type})")]
    ActivityTimedOut {
        activity_id: String,
        timeout_type: TimeoutType,
        details: Payload,
    },

    #[error("Activity {activity_id} canceled")]
    ActivityCanceled { activity_id: String, details: Payload },

    #[error("Timer {timer_id} canceled")]
    TimerCanceled { timer_id: String },

    #[error("Child workflow {workflow_id} failed: {reason}")]
    ChildWorkflowFailed {
        workflow_id: String,
        reason: String,
        details: Payload,
    },

    #[error("Child workflow {workflow_id} canceled")]
    ChildWorkflowCanceled { workflow_id: String, details: Payload },

    #[error("Child workflow {workflow_id} timed out ({timeout_type})")]
    ChildWorkflowTimedOut {
        workflow_id: String,
        timeout_type: TimeoutType,
    },

    #[error("Child workflow {workflow_id} terminated")]
    ChildWorkflowTerminated { workflow_id: String },

    #[error("Child workflow {workflow_id} could not be started: {cause}")]
    StartChildWorkflowFailed { workflow_id: String, cause: String },

    /// Signal or cancellation request to another workflow was rejected
    #[error("External workflow {workflow_id} request failed: {cause}")]
    ExternalWorkflowFailed { workflow_id: String, cause: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable fault; fails the decision task rather than the run
    #[error("Workflow fault: {0}")]
    Fault(String),
}

impl WorkflowError {
    pub fn failed(reason: impl Into<String>, details: impl Into<Payload>) -> Self {
        Self::Failed {
            reason: reason.into(),
            details: details.into(),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault(message.into())
    }

    /// Stable name of the variant, used as failure reason for errors that
    /// carry no reason of their own
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "Failed",
            Self::Canceled { .. } => "Canceled",
            Self::ContinueAsNew(_) => "ContinueAsNew",
            Self::ActivityFailed { .. } => "ActivityFailed",
            Self::ActivityTimedOut { .. } => "ActivityTimedOut",
            Self::ActivityCanceled { .. } => "ActivityCanceled",
            Self::TimerCanceled { .. } => "TimerCanceled",
            Self::ChildWorkflowFailed { .. } => "ChildWorkflowFailed",
            Self::ChildWorkflowCanceled { .. } => "ChildWorkflowCanceled",
            Self::ChildWorkflowTimedOut { .. } => "ChildWorkflowTimedOut",
            Self::ChildWorkflowTerminated { .. } => "ChildWorkflowTerminated",
            Self::StartChildWorkflowFailed { .. } => "StartChildWorkflowFailed",
            Self::ExternalWorkflowFailed { .. } => "ExternalWorkflowFailed",
            Self::Serialization(_) => "Serialization",
            Self::Fault(_) => "Fault",
        }
    }

    /// Whether this error is a cancellation of something the workflow awaited
    pub fn is_canceled(&self) -> bool {
        matches!(
            self,
            Self::Canceled { .. }
                | Self::ActivityCanceled { .. }
                | Self::TimerCanceled { .. }
                | Self::ChildWorkflowCanceled { .. }
        )
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for workflow code
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Failure of a single activity invocation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActivityError {
    /// The attempt's deadline passed before or while the body ran
    #[error("Activity deadline exceeded")]
    DeadlineExceeded,

    #[error("Activity not registered: {0}")]
    NotRegistered(String),

    /// Cancellation was requested by the service or the activity is gone
    #[error("Activity canceled")]
    Canceled { details: Option<Payload> },

    /// Deliberate failure raised by the activity body
    #[error("Activity failed: {reason}")]
    Failed { reason: String, details: Payload },

    #[error("Activity panicked: {0}")]
    Panicked(String),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ActivityError {
    pub fn failed(reason: impl Into<String>, details: impl Into<Payload>) -> Self {
        Self::Failed {
            reason: reason.into(),
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for ActivityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
