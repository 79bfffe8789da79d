//! Dispatch strategies for asynchronous execution
//!
//! All variants share the same coalescing logic in
//! [`OperationCore`](super::core::OperationCore); they differ only in where
//! an execution runs once the state machine has decided one is due:
//!
//! | Strategy | Async execution | Re-run after pending |
//! |----------|-----------------|----------------------|
//! | [`Immediate`] | blocking-pool work item | a fresh work item |
//! | [`Delayed`] | blocking-pool work item after `delay` | through the same delay |
//! | [`LongRunning`] | one dedicated thread (or long blocking task) | loops in place |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use super::operation::{BoundOperation, ScheduledExecution};
use crate::config::MAX_DELAY;
use crate::error::{SchedulerError, SchedulerResult};

mod sealed {
    pub trait Sealed {}
}

/// Where and how an operation executes when triggered asynchronously
///
/// Sealed: the crate provides [`Immediate`], [`Delayed`] and
/// [`LongRunning`].
pub trait Dispatch: sealed::Sealed + Clone + Send + Sync + 'static {
    /// Variant name used in log fields and misuse errors
    const VARIANT: &'static str;

    /// Whether `run(true)` / `try_run(true)` is permitted
    const SUPPORTS_PENDING_SYNCHRONOUSLY: bool = true;

    /// Whether a synchronous caller re-runs pending work itself instead of
    /// handing it to [`Dispatch::dispatch`]
    const RERUN_ON_CALLER: bool = true;

    /// Schedule one execution of an operation already in the running state
    ///
    /// Implementations hand the running state to a `ScheduledExecution`
    /// before anything can fail, so an error or unrun work releases it.
    fn dispatch(&self, operation: &Arc<BoundOperation>) -> SchedulerResult<()>;
}

/// Run on the calling thread, or as a blocking-pool work item when async
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl sealed::Sealed for Immediate {}

impl Dispatch for Immediate {
    const VARIANT: &'static str = "immediate";

    fn dispatch(&self, operation: &Arc<BoundOperation>) -> SchedulerResult<()> {
        let scheduled = ScheduledExecution::new(operation);
        let runtime = operation.core().runtime()?;
        let strategy = *self;
        runtime.spawn_blocking(move || scheduled.run_then_redispatch(&strategy));
        Ok(())
    }
}

/// Run after a configurable delay
///
/// The delay is read at every dispatch, so [`Delayed::set_delay`] affects
/// the next scheduled execution. While waiting out the delay the operation
/// counts as running: triggers that land in the window are coalesced.
#[derive(Debug, Clone)]
pub struct Delayed {
    delay_millis: Arc<AtomicU64>,
}

impl sealed::Sealed for Delayed {}

impl Delayed {
    pub fn new(delay: Duration) -> Self {
        Self { delay_millis: Arc::new(AtomicU64::new(Self::to_millis(delay))) }
    }

    /// Delay applied to the next dispatch
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_millis.load(Ordering::Acquire))
    }

    /// Change the delay for subsequent dispatches; capped at [`MAX_DELAY`]
    pub fn set_delay(&self, delay: Duration) {
        self.delay_millis.store(Self::to_millis(delay), Ordering::Release);
    }

    /// Clamped to [`MAX_DELAY`], the limit configuration validation enforces
    fn to_millis(delay: Duration) -> u64 {
        u64::try_from(delay.min(MAX_DELAY).as_millis()).unwrap_or(u64::MAX)
    }
}

impl Dispatch for Delayed {
    const VARIANT: &'static str = "delayed";
    const SUPPORTS_PENDING_SYNCHRONOUSLY: bool = false;
    const RERUN_ON_CALLER: bool = false;

    fn dispatch(&self, operation: &Arc<BoundOperation>) -> SchedulerResult<()> {
        let scheduled = ScheduledExecution::new(operation);
        let runtime = operation.core().runtime()?;
        let delay = self.delay();
        let token = operation.core().cancellation_token();
        let strategy = self.clone();

        runtime.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {}
            }

            // The token may have been replaced while waiting out the delay.
            let core = scheduled.operation().core();
            if token.is_cancelled() || core.cancellation_token().is_cancelled() {
                warn!(operation = %core.name(), "Delayed execution cancelled before it started");
                return;
            }
            tokio::task::spawn_blocking(move || scheduled.run_then_redispatch(&strategy));
        });
        Ok(())
    }
}

/// Run on one long-lived worker that loops until no work is pending
///
/// `background == false` uses a dedicated named OS thread, which does not
/// need a tokio runtime. `background == true` uses a long blocking task on
/// the runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct LongRunning {
    background: bool,
    thread_name: Arc<str>,
}

impl sealed::Sealed for LongRunning {}

impl LongRunning {
    pub fn new<S: Into<Arc<str>>>(background: bool, thread_name: S) -> Self {
        Self { background, thread_name: thread_name.into() }
    }

    /// Whether executions run on the blocking pool rather than a dedicated thread
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Name given to dedicated worker threads
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}

impl Dispatch for LongRunning {
    const VARIANT: &'static str = "long_running";

    fn dispatch(&self, operation: &Arc<BoundOperation>) -> SchedulerResult<()> {
        let scheduled = ScheduledExecution::new(operation);
        let drain = move || scheduled.drain();

        if self.background {
            operation.core().runtime()?.spawn_blocking(drain);
        } else {
            thread::Builder::new().name(self.thread_name.to_string()).spawn(drain).map_err(
                |source| SchedulerError::Spawn {
                    operation: operation.core().name().to_string(),
                    source,
                },
            )?;
        }
        Ok(())
    }
}
