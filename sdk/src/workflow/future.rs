//! Workflow future types
//!
//! Each operation a workflow can wait on (activity, timer, child workflow,
//! signal, external workflow request) has a future that reads its outcome
//! from the run's replay state. Futures are resolved by history events, never
//! by wall-clock time, so awaiting them is deterministic.

use crate::error::WorkflowResult;
use crate::workflow::env::{SlotKind, WorkflowEnv};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use weft_core::{Payload, WorkflowExecution};

/// Trait for workflow futures that can be cancelled.
///
/// Cancelling an operation whose decision has not been sent yet removes the
/// decision altogether. Otherwise a cancel decision is sent to the service.
pub trait CancellableFuture: Future {
    /// Cancel this operation.
    ///
    /// For activities and timers the future resolves with a canceled error
    /// immediately. A child workflow resolves once the child reports its
    /// cancellation.
    fn cancel(&self);

    /// Check if this future has been cancelled.
    fn is_cancelled(&self) -> bool;
}

type SharedEnv = Arc<Mutex<WorkflowEnv>>;

/// Common part of every slot-backed future
struct SlotFuture {
    env: SharedEnv,
    kind: SlotKind,
    id: String,
    cancelled: AtomicBool,
}

impl SlotFuture {
    fn new(env: SharedEnv, kind: SlotKind, id: String) -> Self {
        Self {
            env,
            kind,
            id,
            cancelled: AtomicBool::new(false),
        }
    }

    fn poll(&self, cx: &mut Context<'_>) -> Poll<WorkflowResult<Payload>> {
        self.env.lock().poll_slot(self.kind, &self.id, cx.waker())
    }

    fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ============================================================================
// ActivityFuture
// ============================================================================

/// Future for a scheduled activity.
///
/// Created by `WorkflowContext::execute_activity_raw()`. Resolves with the
/// activity's raw result, or with the failure, timeout or cancellation
/// recorded in history.
pub struct ActivityFuture {
    inner: SlotFuture,
}

impl ActivityFuture {
    pub(crate) fn new(env: SharedEnv, activity_id: String) -> Self {
        Self {
            inner: SlotFuture::new(env, SlotKind::Activity, activity_id),
        }
    }

    pub fn activity_id(&self) -> &str {
        &self.inner.id
    }
}

impl Future for ActivityFuture {
    type Output = WorkflowResult<Payload>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll(cx)
    }
}

impl CancellableFuture for ActivityFuture {
    fn cancel(&self) {
        self.inner.mark_cancelled();
        self.inner.env.lock().cancel_activity(&self.inner.id);
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

// ============================================================================
// TimerFuture
// ============================================================================

/// Future for a durable timer.
///
/// Created by `WorkflowContext::new_timer()`. Resolves when the timer fires.
pub struct TimerFuture {
    inner: SlotFuture,
}

impl TimerFuture {
    pub(crate) fn new(env: SharedEnv, timer_id: String) -> Self {
        Self {
            inner: SlotFuture::new(env, SlotKind::Timer, timer_id),
        }
    }

    pub fn timer_id(&self) -> &str {
        &self.inner.id
    }
}

impl Future for TimerFuture {
    type Output = WorkflowResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll(cx).map(|result| result.map(|_| ()))
    }
}

impl CancellableFuture for TimerFuture {
    fn cancel(&self) {
        self.inner.mark_cancelled();
        self.inner.env.lock().cancel_timer(&self.inner.id);
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

// ============================================================================
// ChildWorkflowFuture
// ============================================================================

/// Future for a child workflow.
///
/// Created by `WorkflowContext::execute_child_workflow_raw()`. Resolves with
/// the child's raw result once it closes.
pub struct ChildWorkflowFuture {
    inner: SlotFuture,
}

impl ChildWorkflowFuture {
    pub(crate) fn new(env: SharedEnv, workflow_id: String) -> Self {
        Self {
            inner: SlotFuture::new(env, SlotKind::ChildWorkflow, workflow_id),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.inner.id
    }

    /// Execution of the child, once history shows it started
    pub fn execution(&self) -> Option<WorkflowExecution> {
        self.inner.env.lock().child_execution(&self.inner.id)
    }
}

impl Future for ChildWorkflowFuture {
    type Output = WorkflowResult<Payload>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll(cx)
    }
}

impl CancellableFuture for ChildWorkflowFuture {
    fn cancel(&self) {
        self.inner.mark_cancelled();
        self.inner.env.lock().cancel_child_workflow(&self.inner.id);
    }

    fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }
}

// ============================================================================
// ExternalWorkflowFuture
// ============================================================================

/// Future for a signal or cancellation request sent to another workflow.
///
/// Resolves once the service has delivered the request, or with
/// `WorkflowError::ExternalWorkflowFailed` if it could not.
pub struct ExternalWorkflowFuture {
    inner: SlotFuture,
}

impl ExternalWorkflowFuture {
    pub(crate) fn new(env: SharedEnv, control: String) -> Self {
        Self {
            inner: SlotFuture::new(env, SlotKind::External, control),
        }
    }
}

impl Future for ExternalWorkflowFuture {
    type Output = WorkflowResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll(cx).map(|result| result.map(|_| ()))
    }
}

// ============================================================================
// Signals
// ============================================================================

/// Receiving end for signals of one name
#[derive(Clone)]
pub struct SignalChannel {
    env: SharedEnv,
    signal_name: String,
}

impl SignalChannel {
    pub(crate) fn new(env: SharedEnv, signal_name: String) -> Self {
        Self { env, signal_name }
    }

    pub fn name(&self) -> &str {
        &self.signal_name
    }

    /// Wait for the next signal
    pub fn receive(&self) -> SignalFuture {
        SignalFuture {
            channel: self.clone(),
        }
    }

    /// Take the next buffered signal without waiting
    pub fn try_receive(&self) -> Option<Payload> {
        self.env.lock().try_receive_signal(&self.signal_name)
    }
}

impl std::fmt::Debug for SignalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalChannel")
            .field("signal_name", &self.signal_name)
            .finish()
    }
}

/// Future for the next signal on a channel
pub struct SignalFuture {
    channel: SignalChannel,
}

impl Future for SignalFuture {
    type Output = Payload;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.channel
            .env
            .lock()
            .poll_signal(&self.channel.signal_name, cx.waker())
    }
}
