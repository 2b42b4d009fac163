//! Workflow history - event types and attributes

pub mod event;

pub use event::{DecisionTaskFailedCause, EventAttributes, EventType, HistoryEvent};
