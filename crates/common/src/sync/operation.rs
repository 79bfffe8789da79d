//! Synchronized operations with synchronous actions
//!
//! A [`SynchronizedOperation`] guarantees its action never runs
//! concurrently with itself and folds any number of triggers that arrive
//! during an execution into a single follow-up execution.
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! use quiesce_common::sync::ImmediateOperation;
//!
//! let runs = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&runs);
//! let operation = ImmediateOperation::new(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//!     Ok(())
//! });
//!
//! operation.run(false).unwrap();
//! assert_eq!(runs.load(Ordering::SeqCst), 1);
//! assert!(!operation.is_running());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::core::OperationCore;
use super::dispatch::{Delayed, Dispatch, Immediate, LongRunning};
use super::runner::ActionRunner;
use super::state::{OperationState, Trigger};
use crate::error::{SchedulerError, SchedulerResult};

/// Coalescing state machine bound to one synchronous action
///
/// Shared between the operation handle and every in-flight execution.
#[derive(Debug)]
pub struct BoundOperation {
    core: OperationCore,
    runner: ActionRunner,
}

impl BoundOperation {
    pub(crate) fn new(core: OperationCore, runner: ActionRunner) -> Self {
        Self { core, runner }
    }

    /// Shared state machine
    pub fn core(&self) -> &OperationCore {
        &self.core
    }

    /// Execute the action once on the calling thread
    pub(crate) fn execute_once(&self) -> bool {
        let _scope = self.core.enter_execution();
        let token = self.core.cancellation_token();
        self.runner.execute(self.core.name(), &token)
    }

    /// Dispatch through `strategy`
    ///
    /// On error the `ScheduledExecution` built by the strategy has
    /// already released the state.
    pub(crate) fn dispatch_with<D: Dispatch>(
        self: &Arc<Self>,
        strategy: &D,
    ) -> SchedulerResult<()> {
        debug!(operation = %self.core.name(), variant = D::VARIANT, "Dispatching execution");
        strategy.dispatch(self).inspect_err(|error| {
            warn!(
                operation = %self.core.name(),
                variant = D::VARIANT,
                error = %error,
                "Dispatch failed, operation released"
            );
        })
    }

    /// Re-dispatch a pending execution from a worker context
    ///
    /// Failures are logged by `dispatch_with`; there is no caller to return
    /// them to.
    pub(crate) fn redispatch<D: Dispatch>(self: &Arc<Self>, strategy: &D) {
        let _ = self.dispatch_with(strategy);
    }
}

/// Ownership of the running state, handed to a scheduled execution
///
/// A runtime that is shutting down accepts `spawn` and `spawn_blocking`
/// and then drops the work unrun. Dropping a still-armed execution
/// releases the state so later triggers are not folded into a re-run that
/// never happens.
pub(crate) struct ScheduledExecution {
    operation: Arc<BoundOperation>,
    armed: bool,
}

impl ScheduledExecution {
    /// Caller must own the running state of `operation`
    pub(crate) fn new(operation: &Arc<BoundOperation>) -> Self {
        Self { operation: Arc::clone(operation), armed: true }
    }

    pub(crate) fn operation(&self) -> &Arc<BoundOperation> {
        &self.operation
    }

    /// Execute once, then re-dispatch through `strategy` if a trigger is pending
    pub(crate) fn run_then_redispatch<D: Dispatch>(mut self, strategy: &D) {
        self.operation.execute_once();
        self.armed = false;
        if self.operation.core().finish() {
            self.operation.redispatch(strategy);
        }
    }

    /// Execute until no trigger is pending
    pub(crate) fn drain(mut self) {
        loop {
            self.operation.execute_once();
            self.armed = false;
            if !self.operation.core().finish() {
                break;
            }
            self.armed = true;
        }
    }
}

impl Drop for ScheduledExecution {
    fn drop(&mut self) {
        if self.armed {
            debug!(operation = %self.operation.core().name(), "Scheduled execution dropped unrun");
            self.operation.core().abandon();
        }
    }
}

/// At-most-one-concurrent action with trigger coalescing
///
/// The dispatch strategy `D` decides where asynchronous executions run.
/// Cloning is not offered; share the operation behind an `Arc`.
pub struct SynchronizedOperation<D: Dispatch = Immediate> {
    inner: Arc<BoundOperation>,
    strategy: D,
}

/// Runs on the caller thread, or the blocking pool when async
pub type ImmediateOperation = SynchronizedOperation<Immediate>;
/// Runs after a configurable delay
pub type DelayedOperation = SynchronizedOperation<Delayed>;
/// Runs on a long-lived worker that drains pending work
pub type LongRunningOperation = SynchronizedOperation<LongRunning>;

impl<D: Dispatch + fmt::Debug> fmt::Debug for SynchronizedOperation<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizedOperation")
            .field("name", &self.inner.core.name())
            .field("state", &self.state())
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl<D: Dispatch> SynchronizedOperation<D> {
    pub(crate) fn from_parts(inner: BoundOperation, strategy: D) -> Self {
        Self { inner: Arc::new(inner), strategy }
    }

    /// Operation name used in logs
    pub fn name(&self) -> &str {
        self.inner.core.name()
    }

    /// Run the action, or coalesce into a pending re-run if busy
    ///
    /// When idle the action runs on the calling thread. When busy the
    /// trigger is recorded and the call returns at once, unless
    /// `run_pending_synchronously` is set, in which case the caller blocks
    /// until the operation is idle again. That wait has no fairness: it can
    /// last indefinitely while other threads keep re-triggering.
    pub fn run(&self, run_pending_synchronously: bool) -> SchedulerResult<()> {
        self.check_pending_synchronously("run", run_pending_synchronously)?;
        match self.inner.core.begin() {
            Trigger::Started => self.drive_on_caller(),
            Trigger::Coalesced => {
                debug!(operation = %self.name(), variant = D::VARIANT, "Trigger coalesced");
                if run_pending_synchronously {
                    self.inner.core.wait_for_quiescence();
                }
                Ok(())
            }
        }
    }

    /// Run the action only if idle; a busy operation is left untouched
    ///
    /// Returns `Ok(true)` if this call executed the action.
    pub fn try_run(&self, run_pending_synchronously: bool) -> SchedulerResult<bool> {
        self.check_pending_synchronously("try_run", run_pending_synchronously)?;
        if !self.inner.core.try_begin() {
            return Ok(false);
        }
        self.drive_on_caller()?;
        Ok(true)
    }

    /// Dispatch the action through the variant strategy, or coalesce if busy
    pub fn run_async(&self) -> SchedulerResult<()> {
        match self.inner.core.begin() {
            Trigger::Started => self.inner.dispatch_with(&self.strategy),
            Trigger::Coalesced => {
                debug!(operation = %self.name(), variant = D::VARIANT, "Trigger coalesced");
                Ok(())
            }
        }
    }

    /// Dispatch only if idle
    ///
    /// Returns `Ok(true)` if this call scheduled an execution.
    pub fn try_run_async(&self) -> SchedulerResult<bool> {
        if !self.inner.core.try_begin() {
            return Ok(false);
        }
        self.inner.dispatch_with(&self.strategy)?;
        Ok(true)
    }

    /// Snapshot: an execution is in flight or scheduled
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Snapshot: a re-run has been requested
    pub fn is_pending(&self) -> bool {
        self.state().is_pending()
    }

    /// Snapshot of the full run state
    pub fn state(&self) -> OperationState {
        self.inner.core.state()
    }

    /// Token passed to subsequent executions
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.core.cancellation_token()
    }

    /// Replace the token passed to subsequent executions
    pub fn set_cancellation_token(&self, token: CancellationToken) {
        self.inner.core.set_cancellation_token(token);
    }

    /// Block until idle or until `timeout` elapses; `true` if idle
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.inner.core.wait_until_idle(timeout)
    }

    /// Wait asynchronously until idle
    pub async fn idle(&self) {
        self.inner.core.idle().await;
    }

    fn check_pending_synchronously(
        &self,
        operation: &'static str,
        run_pending_synchronously: bool,
    ) -> SchedulerResult<()> {
        if run_pending_synchronously && !D::SUPPORTS_PENDING_SYNCHRONOUSLY {
            return Err(SchedulerError::invalid_operation(
                operation,
                D::VARIANT,
                "pending executions cannot be run synchronously by this variant",
            ));
        }
        Ok(())
    }

    fn drive_on_caller(&self) -> SchedulerResult<()> {
        loop {
            self.inner.execute_once();
            if !self.inner.core.finish() {
                return Ok(());
            }
            if !D::RERUN_ON_CALLER {
                return self.inner.dispatch_with(&self.strategy);
            }
        }
    }
}

impl SynchronizedOperation<Delayed> {
    /// Delay applied to the next dispatch
    pub fn delay(&self) -> Duration {
        self.strategy.delay()
    }

    /// Change the delay for subsequent dispatches
    ///
    /// Delays past [`MAX_DELAY`](crate::config::MAX_DELAY) are clamped.
    pub fn set_delay(&self, delay: Duration) {
        self.strategy.set_delay(delay);
    }
}

impl SynchronizedOperation<LongRunning> {
    /// Whether executions use the blocking pool instead of a dedicated thread
    pub fn is_background(&self) -> bool {
        self.strategy.is_background()
    }
}
