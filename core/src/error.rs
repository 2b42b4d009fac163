//! Core error types for the weft workflow runtime
//!
//! These errors are shared by the replay engine and the activity executor.
//! SDK-level error types wrap or extend them.

/// Core error type for history and configuration handling
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// History is malformed (gaps, regressions, missing start event)
    #[error("Invalid history: {0}")]
    InvalidHistory(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Mismatch between replayed workflow code and the recorded history
///
/// These errors indicate that a workflow's behavior during replay differs
/// from its behavior during the original execution, which violates the
/// determinism requirement for workflow code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonDeterminismError {
    /// The decision produced at this position is not the recorded one
    MismatchedDecision {
        event_id: i64,
        decision: String,
        event: String,
    },

    /// Workflow code produced a decision that history has no record of
    MissingDecisionEvent { event_id: i64, decision: String },

    /// History records a decision that workflow code did not produce
    UnexpectedDecisionEvent { event_id: i64, event: String },
}

impl NonDeterminismError {
    /// Id of the history event where replay diverged
    pub fn event_id(&self) -> i64 {
        match self {
            Self::MismatchedDecision { event_id, .. }
            | Self::MissingDecisionEvent { event_id, .. }
            | Self::UnexpectedDecisionEvent { event_id, .. } => *event_id,
        }
    }
}

impl std::fmt::Display for NonDeterminismError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MismatchedDecision {
                event_id,
                decision,
                event,
            } => {
                write!(
                    f,
                    "nondeterministic workflow: history event {} is {}, replay decision is {}",
                    event_id, event, decision
                )
            }
            Self::MissingDecisionEvent { event_id, decision } => {
                write!(
                    f,
                    "nondeterministic workflow: missing replay decision event for {} (last event {})",
                    decision, event_id
                )
            }
            Self::UnexpectedDecisionEvent { event_id, event } => {
                write!(
                    f,
                    "nondeterministic workflow: history event {} is {}, replay produced no decision for it",
                    event_id, event
                )
            }
        }
    }
}

impl std::error::Error for NonDeterminismError {}
