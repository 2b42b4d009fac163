//! Testing utilities for workflows and activities.
//!
//! - [`HistoryBuilder`] composes workflow histories and the decision, query
//!   and follow-up tasks that carry them.
//! - [`MockWorkflowService`] scripts heartbeat responses and history pages.
//! - [`MockActivityContext`] runs activity bodies without a handler.

mod history;
mod mock_activity_context;
mod service;

pub use history::HistoryBuilder;
pub use mock_activity_context::{MockActivityContext, MockActivityContextBuilder};
pub use service::MockWorkflowService;
