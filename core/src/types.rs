//! Identity and value types shared by history events, decisions and tasks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque serialized value carried by events and decisions.
///
/// The runtime never interprets payload bytes; encoding is owned by the
/// workflow and activity code.
pub type Payload = Vec<u8>;

/// Identity of a single workflow run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl fmt::Display for WorkflowExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.run_id)
    }
}

/// Registered name of a workflow implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowType {
    pub name: String,
}

impl WorkflowType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Registered name of an activity implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityType {
    pub name: String,
}

impl ActivityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskListKind {
    #[default]
    Normal,
    /// Worker-specific list used to route follow-up decision tasks of a cached run.
    Sticky,
}

/// Queue a task is dispatched on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskList {
    pub name: String,
    #[serde(default)]
    pub kind: TaskListKind,
}

impl TaskList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TaskListKind::Normal,
        }
    }

    pub fn sticky(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TaskListKind::Sticky,
        }
    }
}

/// Indexed key/value pairs attached to a workflow for visibility queries.
///
/// Stored in a `BTreeMap` so that equality ignores insertion order and the
/// serialized form is stable across replays.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAttributes {
    pub indexed_fields: BTreeMap<String, Payload>,
}

impl SearchAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.indexed_fields.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.indexed_fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indexed_fields.len()
    }
}

impl<K: Into<String>, V: Into<Payload>> FromIterator<(K, V)> for SearchAttributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            indexed_fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Which timeout fired for an activity, decision or workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeoutType {
    StartToClose,
    ScheduleToStart,
    ScheduleToClose,
    Heartbeat,
}

impl fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeoutType::StartToClose => "START_TO_CLOSE",
            TimeoutType::ScheduleToStart => "SCHEDULE_TO_START",
            TimeoutType::ScheduleToClose => "SCHEDULE_TO_CLOSE",
            TimeoutType::Heartbeat => "HEARTBEAT",
        };
        f.write_str(s)
    }
}
