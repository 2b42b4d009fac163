//! Worker configuration
//!
//! This module provides configuration for decision task processing and
//! activity execution, with sensible defaults and presets, plus the
//! process-wide size of the sticky execution cache.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use weft_core::{ExponentialRetryPolicy, TaskList};

/// Capacity of the shared sticky cache when never configured
pub const DEFAULT_STICKY_CACHE_SIZE: usize = 10_000;

static STICKY_CACHE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_STICKY_CACHE_SIZE);

/// Set the capacity of the process-wide sticky execution cache.
///
/// Must be called before any worker processes its first decision task;
/// once the shared cache exists the call fails with
/// [`ConfigError::CacheAlreadyInitialized`].
pub fn set_sticky_workflow_cache_size(size: usize) -> Result<(), ConfigError> {
    if size == 0 {
        return Err(ConfigError::InvalidValue(
            "sticky workflow cache size must be positive".to_string(),
        ));
    }
    if crate::worker::cache::is_shared_cache_initialized() {
        return Err(ConfigError::CacheAlreadyInitialized);
    }
    STICKY_CACHE_SIZE.store(size, Ordering::SeqCst);
    Ok(())
}

/// Capacity the shared sticky execution cache is (or will be) created with
pub fn sticky_workflow_cache_size() -> usize {
    STICKY_CACHE_SIZE.load(Ordering::SeqCst)
}

/// What to do when replayed workflow code no longer matches its history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NonDeterministicWorkflowPolicy {
    /// Fail the decision task and leave the run blocked until the code is fixed
    #[default]
    BlockWorkflow,
    /// Close the run with a fail-workflow decision
    FailWorkflow,
}

/// Configuration for decision task processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionWorkerConfig {
    /// Keep replayed state cached between decision tasks of a run
    pub sticky_execution: bool,
    /// How long the service waits for this worker to pick up a sticky task
    pub sticky_schedule_to_start_timeout: Duration,
    /// Reaction to non-deterministic workflow code
    pub non_deterministic_workflow_policy: NonDeterministicWorkflowPolicy,
}

impl Default for DecisionWorkerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl DecisionWorkerConfig {
    /// Default configuration suitable for most use cases
    pub const DEFAULT: Self = Self {
        sticky_execution: true,
        sticky_schedule_to_start_timeout: Duration::from_secs(5),
        non_deterministic_workflow_policy: NonDeterministicWorkflowPolicy::BlockWorkflow,
    };

    /// Replay full history on every decision task
    pub const NO_STICKY: Self = Self {
        sticky_execution: false,
        sticky_schedule_to_start_timeout: Duration::from_secs(5),
        non_deterministic_workflow_policy: NonDeterministicWorkflowPolicy::BlockWorkflow,
    };

    /// Create a new configuration with validation
    pub fn new(
        sticky_execution: bool,
        sticky_schedule_to_start_timeout: Duration,
        non_deterministic_workflow_policy: NonDeterministicWorkflowPolicy,
    ) -> Result<Self, ConfigError> {
        if sticky_execution && sticky_schedule_to_start_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "sticky_schedule_to_start_timeout must be positive".to_string(),
            ));
        }

        Ok(Self {
            sticky_execution,
            sticky_schedule_to_start_timeout,
            non_deterministic_workflow_policy,
        })
    }
}

/// Configuration for activity execution
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityWorkerConfig {
    /// Heartbeat flush interval when the activity has no heartbeat timeout
    pub default_heartbeat_throttle_interval: Duration,
    /// Upper bound on the heartbeat flush interval
    pub max_heartbeat_throttle_interval: Duration,
    /// Retry policy for heartbeat calls
    pub heartbeat_retry_policy: ExponentialRetryPolicy,
}

impl Default for ActivityWorkerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ActivityWorkerConfig {
    /// Default configuration suitable for most use cases
    pub const DEFAULT: Self = Self {
        default_heartbeat_throttle_interval: Duration::from_secs(30),
        max_heartbeat_throttle_interval: Duration::from_secs(60),
        heartbeat_retry_policy: ExponentialRetryPolicy::DEFAULT,
    };

    /// Create a new configuration with validation
    pub fn new(
        default_heartbeat_throttle_interval: Duration,
        max_heartbeat_throttle_interval: Duration,
        heartbeat_retry_policy: ExponentialRetryPolicy,
    ) -> Result<Self, ConfigError> {
        if default_heartbeat_throttle_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "default_heartbeat_throttle_interval must be positive".to_string(),
            ));
        }
        if max_heartbeat_throttle_interval < default_heartbeat_throttle_interval {
            return Err(ConfigError::InvalidValue(
                "max_heartbeat_throttle_interval must not be below the default interval"
                    .to_string(),
            ));
        }
        if heartbeat_retry_policy.backoff_coefficient < 1.0 {
            return Err(ConfigError::InvalidValue(
                "heartbeat backoff_coefficient must be at least 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&heartbeat_retry_policy.jitter) {
            return Err(ConfigError::InvalidValue(
                "heartbeat jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(Self {
            default_heartbeat_throttle_interval,
            max_heartbeat_throttle_interval,
            heartbeat_retry_policy,
        })
    }

    /// Interval at which buffered heartbeats are flushed to the service.
    ///
    /// 80% of the activity's heartbeat timeout, capped by
    /// `max_heartbeat_throttle_interval`.
    pub fn heartbeat_throttle_interval(&self, heartbeat_timeout: Duration) -> Duration {
        if heartbeat_timeout.is_zero() {
            return self.default_heartbeat_throttle_interval;
        }
        heartbeat_timeout
            .mul_f64(0.8)
            .min(self.max_heartbeat_throttle_interval)
    }
}

/// Complete configuration of a worker
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub domain: String,
    pub task_list: String,
    /// Identity reported to the service with every response
    pub identity: String,
    /// Identifies the deployed workflow code; defaults to the executable's SHA-256
    pub binary_checksum: String,
    pub decision: DecisionWorkerConfig,
    pub activity: ActivityWorkerConfig,
    sticky_task_list: String,
}

impl WorkerOptions {
    /// Options with default identity, checksum and presets
    pub fn new(domain: impl Into<String>, task_list: impl Into<String>) -> Self {
        let host = host_name();
        Self {
            domain: domain.into(),
            task_list: task_list.into(),
            identity: format!("{}@{}", std::process::id(), host),
            binary_checksum: default_binary_checksum().to_string(),
            decision: DecisionWorkerConfig::DEFAULT,
            activity: ActivityWorkerConfig::DEFAULT,
            sticky_task_list: format!("{}:{}", host, uuid::Uuid::new_v4()),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_binary_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.binary_checksum = checksum.into();
        self
    }

    pub fn with_decision_config(mut self, config: DecisionWorkerConfig) -> Self {
        self.decision = config;
        self
    }

    pub fn with_activity_config(mut self, config: ActivityWorkerConfig) -> Self {
        self.activity = config;
        self
    }

    pub fn with_sticky_execution(mut self, enabled: bool) -> Self {
        self.decision.sticky_execution = enabled;
        self
    }

    pub fn with_non_deterministic_workflow_policy(
        mut self,
        policy: NonDeterministicWorkflowPolicy,
    ) -> Self {
        self.decision.non_deterministic_workflow_policy = policy;
        self
    }

    /// Worker-specific task list follow-up decision tasks are routed to
    pub fn sticky_task_list(&self) -> TaskList {
        TaskList::sticky(self.sticky_task_list.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.is_empty() {
            return Err(ConfigError::InvalidValue("domain must be set".to_string()));
        }
        if self.task_list.is_empty() {
            return Err(ConfigError::InvalidValue(
                "task_list must be set".to_string(),
            ));
        }
        DecisionWorkerConfig::new(
            self.decision.sticky_execution,
            self.decision.sticky_schedule_to_start_timeout,
            self.decision.non_deterministic_workflow_policy,
        )?;
        ActivityWorkerConfig::new(
            self.activity.default_heartbeat_throttle_interval,
            self.activity.max_heartbeat_throttle_interval,
            self.activity.heartbeat_retry_policy.clone(),
        )?;
        Ok(())
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// SHA-256 of the running executable, computed once per process.
pub fn default_binary_checksum() -> &'static str {
    static CHECKSUM: OnceLock<String> = OnceLock::new();
    CHECKSUM.get_or_init(|| {
        std::env::current_exe()
            .and_then(std::fs::read)
            .map(|bytes| format!("{:x}", Sha256::digest(&bytes)))
            .unwrap_or_else(|_| format!("weft-sdk-{}", env!("CARGO_PKG_VERSION")))
    })
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The shared sticky cache was created before its size was set
    #[error("Sticky workflow cache is already in use; set its size before starting workers")]
    CacheAlreadyInitialized,
}
