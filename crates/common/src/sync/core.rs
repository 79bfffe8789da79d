//! Shared coalescing state machine
//!
//! [`OperationCore`] is the part every variant has in common: the atomic run
//! flag, the replaceable cancellation token, the runtime handle used for
//! asynchronous dispatch, and the signalling that lets callers wait for the
//! operation to go idle. It never runs user code itself.

use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::state::{OperationState, StateCell, Trigger};
use crate::error::{SchedulerError, SchedulerResult};

/// Upper bound on a single condvar wait before the state is re-checked
const IDLE_RECHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Coalescing state machine shared by all operation variants
#[derive(Debug)]
pub struct OperationCore {
    name: String,
    state: StateCell,
    cancellation: RwLock<CancellationToken>,
    runtime: Option<Handle>,
    executing_thread: Mutex<Option<ThreadId>>,
    idle_lock: Mutex<()>,
    idle_signal: Condvar,
    idle_notify: Notify,
}

impl OperationCore {
    pub fn new(name: String, cancellation: CancellationToken, runtime: Option<Handle>) -> Self {
        Self {
            name,
            state: StateCell::new(),
            cancellation: RwLock::new(cancellation),
            runtime,
            executing_thread: Mutex::new(None),
            idle_lock: Mutex::new(()),
            idle_signal: Condvar::new(),
            idle_notify: Notify::new(),
        }
    }

    /// Operation name used in logs
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the run state
    pub fn state(&self) -> OperationState {
        self.state.load()
    }

    /// Start if idle, otherwise coalesce into the pending flag
    pub fn begin(&self) -> Trigger {
        let trigger = self.state.trigger();
        trace!(operation = %self.name, ?trigger, "Operation triggered");
        trigger
    }

    /// Start only if idle
    pub fn try_begin(&self) -> bool {
        let started = self.state.try_start();
        trace!(operation = %self.name, started, "Operation try-triggered");
        started
    }

    /// Finish one execution; `true` means the action must run again
    pub fn finish(&self) -> bool {
        let run_again = self.state.complete();
        if run_again {
            trace!(operation = %self.name, "Pending trigger consumed, running again");
        } else {
            self.signal_idle();
        }
        run_again
    }

    /// Give up on an execution that was scheduled but can no longer happen
    pub fn abandon(&self) {
        let previous = self.state.reset();
        if previous.is_pending() {
            warn!(operation = %self.name, "Dropping pending re-run of abandoned execution");
        }
        self.signal_idle();
    }

    /// Current cancellation token (cloned; clones share cancellation)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.read().clone()
    }

    /// Replace the cancellation token used by subsequent executions
    pub fn set_cancellation_token(&self, token: CancellationToken) {
        *self.cancellation.write() = token;
    }

    /// Runtime handle for asynchronous dispatch
    pub fn runtime(&self) -> SchedulerResult<&Handle> {
        self.runtime.as_ref().ok_or_else(|| SchedulerError::no_runtime(self.name.clone()))
    }

    /// Record that the calling thread is executing the action
    pub fn enter_execution(&self) -> ExecutionScope<'_> {
        *self.executing_thread.lock() = Some(thread::current().id());
        ExecutionScope { core: self }
    }

    /// Whether the calling thread is the one currently executing the action
    pub fn is_executing_on_current_thread(&self) -> bool {
        *self.executing_thread.lock() == Some(thread::current().id())
    }

    /// Block until the operation is `NotRunning`
    ///
    /// No fairness: if other threads keep re-triggering, this can wait
    /// indefinitely. Returns immediately when called from inside the action,
    /// since the pending flag already guarantees a later execution.
    pub fn wait_for_quiescence(&self) {
        if self.is_executing_on_current_thread() {
            trace!(operation = %self.name, "Synchronous wait skipped inside own action");
            return;
        }
        let mut guard = self.idle_lock.lock();
        while self.state.load().is_running() {
            self.idle_signal.wait_for(&mut guard, IDLE_RECHECK_INTERVAL);
        }
    }

    /// Block until the operation is `NotRunning` or `timeout` elapses
    ///
    /// Returns `true` if the operation was observed idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.idle_lock.lock();
        while self.state.load().is_running() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(IDLE_RECHECK_INTERVAL);
            self.idle_signal.wait_for(&mut guard, slice);
        }
        true
    }

    /// Wait asynchronously until the operation is `NotRunning`
    pub async fn idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.state.load().is_running() {
                return;
            }
            notified.await;
        }
    }

    fn signal_idle(&self) {
        {
            let _guard = self.idle_lock.lock();
            self.idle_signal.notify_all();
        }
        self.idle_notify.notify_waiters();
    }
}

/// Marks the current thread as executing the action until dropped
#[derive(Debug)]
pub struct ExecutionScope<'a> {
    core: &'a OperationCore,
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        *self.core.executing_thread.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the shared state machine.
    use std::sync::Arc;

    use super::*;

    fn core() -> OperationCore {
        OperationCore::new("core-test".into(), CancellationToken::new(), None)
    }

    /// Validates idle waiting returns once the last execution finishes.
    #[test]
    fn test_wait_until_idle_after_finish() {
        let core = Arc::new(core());
        assert_eq!(core.begin(), Trigger::Started);
        assert!(!core.wait_until_idle(Duration::from_millis(20)));

        let finisher = Arc::clone(&core);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            finisher.finish()
        });

        assert!(core.wait_until_idle(Duration::from_secs(5)));
        assert!(!handle.join().expect("finisher should complete"));
    }

    /// Validates abandoning a pending execution resets the state.
    #[test]
    fn test_abandon_resets_state() {
        let core = core();
        core.begin();
        core.begin();
        assert_eq!(core.state(), OperationState::RunningAndPending);
        core.abandon();
        assert_eq!(core.state(), OperationState::NotRunning);
        assert!(core.wait_until_idle(Duration::ZERO));
    }

    /// Validates missing runtime is reported as an error, not a panic.
    #[test]
    fn test_runtime_missing() {
        let err = core().runtime().unwrap_err();
        assert!(matches!(err, SchedulerError::NoRuntime { ref operation } if operation == "core-test"));
    }

    /// Validates token replacement affects later reads only.
    #[test]
    fn test_cancellation_token_replacement() {
        let core = core();
        let first = core.cancellation_token();
        first.cancel();
        assert!(core.cancellation_token().is_cancelled());

        core.set_cancellation_token(CancellationToken::new());
        assert!(!core.cancellation_token().is_cancelled());
        assert!(first.is_cancelled());
    }

    /// Validates the executing-thread marker is scoped.
    #[test]
    fn test_execution_scope_marks_thread() {
        let core = core();
        assert!(!core.is_executing_on_current_thread());
        {
            let _scope = core.enter_execution();
            assert!(core.is_executing_on_current_thread());
            core.begin();
            core.wait_for_quiescence();
        }
        assert!(!core.is_executing_on_current_thread());
    }

    /// Validates async idle waiting wakes on finish.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_idle() {
        let core = Arc::new(core());
        core.begin();
        let finisher = Arc::clone(&core);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            finisher.finish();
        });
        tokio::time::timeout(Duration::from_secs(5), core.idle())
            .await
            .expect("core should go idle");
    }
}
