//! Synchronized operations with asynchronous actions
//!
//! A [`TaskOperation`] applies the same coalescing protocol to an action
//! that returns a future. The future awaited by [`TaskOperation::run_async`]
//! drives the execution loop itself: it completes once the action has run,
//! including any re-run requested while it was in flight.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::core::OperationCore;
use super::runner::AsyncActionRunner;
use super::state::{OperationState, Trigger};
use crate::error::{SchedulerError, SchedulerResult};

const VARIANT: &str = "task";

struct TaskShared {
    core: OperationCore,
    runner: AsyncActionRunner,
}

/// Ownership of the running state for one drive of the execution loop
///
/// Created before the driving future is spawned or awaited. If that future
/// is dropped before completing, including when a shut-down runtime
/// discards it unpolled, the state is released.
struct ScheduledDrive {
    shared: Arc<TaskShared>,
    armed: bool,
}

impl ScheduledDrive {
    /// Caller must own the running state
    fn new(shared: &Arc<TaskShared>) -> Self {
        Self { shared: Arc::clone(shared), armed: true }
    }

    /// Execute until no trigger is pending
    async fn drive(mut self) {
        let shared = Arc::clone(&self.shared);
        loop {
            let token = shared.core.cancellation_token();
            shared.runner.execute(shared.core.name(), token).await;
            self.armed = false;
            if !shared.core.finish() {
                break;
            }
            self.armed = true;
        }
    }
}

impl Drop for ScheduledDrive {
    fn drop(&mut self) {
        if self.armed {
            debug!(operation = %self.shared.core.name(), "Task execution dropped before completion");
            self.shared.core.abandon();
        }
    }
}

/// At-most-one-concurrent asynchronous action with trigger coalescing
///
/// # Example
///
/// ```rust
/// use quiesce_common::sync::TaskOperation;
///
/// # #[tokio::main]
/// # async fn main() {
/// let operation = TaskOperation::new(|_token| async { Ok(()) });
/// operation.run_async().await;
/// assert!(!operation.is_running());
/// # }
/// ```
pub struct TaskOperation {
    inner: Arc<TaskShared>,
}

impl fmt::Debug for TaskOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOperation")
            .field("name", &self.inner.core.name())
            .field("state", &self.state())
            .field("runner", &self.inner.runner)
            .finish()
    }
}

impl TaskOperation {
    pub(crate) fn from_parts(core: OperationCore, runner: AsyncActionRunner) -> Self {
        Self { inner: Arc::new(TaskShared { core, runner }) }
    }

    /// Operation name used in logs
    pub fn name(&self) -> &str {
        self.inner.core.name()
    }

    /// Run the action, or coalesce if busy
    ///
    /// When this call starts the execution, the returned future completes
    /// after the action and any coalesced re-run. When the operation was
    /// already busy it completes at once; the in-flight execution will run
    /// the action again. Dropping the future early releases the operation
    /// and discards any pending re-run.
    pub async fn run_async(&self) {
        match self.inner.core.begin() {
            Trigger::Started => ScheduledDrive::new(&self.inner).drive().await,
            Trigger::Coalesced => {
                debug!(operation = %self.name(), variant = VARIANT, "Trigger coalesced");
            }
        }
    }

    /// Run the action only if idle; `true` if this call executed it
    pub async fn try_run_async(&self) -> bool {
        if !self.inner.core.try_begin() {
            return false;
        }
        ScheduledDrive::new(&self.inner).drive().await;
        true
    }

    /// Start the action on the runtime without waiting for it
    ///
    /// `run_pending_synchronously` is not supported: blocking a thread on
    /// an asynchronous action is rejected with
    /// [`SchedulerError::InvalidOperation`].
    pub fn run(&self, run_pending_synchronously: bool) -> SchedulerResult<()> {
        Self::check_pending_synchronously("run", run_pending_synchronously)?;
        self.inner.core.runtime()?;
        match self.inner.core.begin() {
            Trigger::Started => self.spawn_drive(),
            Trigger::Coalesced => {
                debug!(operation = %self.name(), variant = VARIANT, "Trigger coalesced");
                Ok(())
            }
        }
    }

    /// Start the action on the runtime only if idle
    ///
    /// Returns `Ok(true)` if this call scheduled an execution.
    pub fn try_run(&self, run_pending_synchronously: bool) -> SchedulerResult<bool> {
        Self::check_pending_synchronously("try_run", run_pending_synchronously)?;
        self.inner.core.runtime()?;
        if !self.inner.core.try_begin() {
            return Ok(false);
        }
        self.spawn_drive()?;
        Ok(true)
    }

    /// Snapshot: an execution is in flight
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
    ///
    /// Must not be called from a runtime worker thread that the execution
    /// itself needs.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.inner.core.wait_until_idle(timeout)
    }

    /// Wait asynchronously until idle
    pub async fn idle(&self) {
        self.inner.core.idle().await;
    }

    fn check_pending_synchronously(
        operation: &'static str,
        run_pending_synchronously: bool,
    ) -> SchedulerResult<()> {
        if run_pending_synchronously {
            return Err(SchedulerError::invalid_operation(
                operation,
                VARIANT,
                "asynchronous actions cannot be waited on synchronously",
            ));
        }
        Ok(())
    }

    fn spawn_drive(&self) -> SchedulerResult<()> {
        let scheduled = ScheduledDrive::new(&self.inner);
        let runtime = self.inner.core.runtime().inspect_err(|error| {
            warn!(operation = %self.name(), error = %error, "Dispatch failed, operation released");
        })?;
        debug!(operation = %self.name(), variant = VARIANT, "Dispatching execution");
        runtime.spawn(scheduled.drive());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the task-based variant.
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;
    use crate::sync::OperationBuilder;

    /// Validates an idle run completes the action before resolving.
    #[tokio::test]
    async fn test_run_async_completes_action() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let operation = TaskOperation::new(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        operation.run_async().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(operation.state(), OperationState::NotRunning);
    }

    /// Validates triggers during an execution fold into one re-run.
    ///
    /// Assertions:
    /// - Coalesced callers resolve immediately.
    /// - The starting caller resolves after exactly two executions.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_coalesced_triggers_rerun_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());

        let counter = Arc::clone(&runs);
        let gate_in = Arc::clone(&gate);
        let entered_in = Arc::clone(&entered);
        let operation = Arc::new(TaskOperation::new(move |_| {
            let counter = Arc::clone(&counter);
            let gate = Arc::clone(&gate_in);
            let entered = Arc::clone(&entered_in);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    entered.notify_one();
                    gate.notified().await;
                }
                Ok(())
            }
        }));

        let driver = {
            let operation = Arc::clone(&operation);
            tokio::spawn(async move { operation.run_async().await })
        };
        entered.notified().await;

        operation.run_async().await;
        operation.run_async().await;
        assert!(operation.is_pending());

        gate.notify_one();
        driver.await.expect("driver task should finish");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!operation.is_running());
    }

    /// Validates synchronous waiting is rejected.
    #[tokio::test]
    async fn test_run_pending_synchronously_rejected() {
        let operation = TaskOperation::new(|_| async { Ok(()) });
        let err = operation.run(true).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidOperation { operation: "run", variant: "task", .. }
        ));
        assert!(operation.try_run(true).is_err());
        assert!(!operation.is_running());
    }

    /// Validates fire-and-forget runs need a runtime.
    #[test]
    fn test_run_without_runtime() {
        let operation = OperationBuilder::new("no-runtime")
            .build_task(|_| async { Ok(()) })
            .expect("valid config");
        assert!(matches!(operation.run(false), Err(SchedulerError::NoRuntime { .. })));
        assert!(!operation.is_running());
    }

    /// Validates dropping the driving future releases the operation.
    #[tokio::test]
    async fn test_dropped_driver_releases_state() {
        let operation = TaskOperation::new(|_| async {
            std::future::pending::<()>().await;
            Ok(())
        });

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), operation.run_async()).await;
        assert!(timed_out.is_err());
        assert_eq!(operation.state(), OperationState::NotRunning);
    }

    /// Validates fire-and-forget runs complete on the runtime.
    #[tokio::test]
    async fn test_run_spawns_on_runtime() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let operation = TaskOperation::new(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        assert!(operation.try_run(false).unwrap());
        tokio::time::timeout(Duration::from_secs(5), operation.idle())
            .await
            .expect("operation should go idle");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
