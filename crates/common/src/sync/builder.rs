//! Operation construction
//!
//! [`OperationBuilder`] binds an action to a configured operation. Short
//! constructors such as [`ImmediateOperation::new`] cover the common case:
//! default name, tracing diagnostics, the ambient tokio runtime if any.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::core::OperationCore;
use super::dispatch::{Delayed, Immediate, LongRunning};
use super::operation::{
    BoundOperation, DelayedOperation, ImmediateOperation, LongRunningOperation,
    SynchronizedOperation,
};
use super::runner::{ActionRunner, AsyncActionRunner, ExceptionHandler, FailureRouter};
use super::task::TaskOperation;
use crate::config::OperationConfig;
use crate::diagnostics::{DiagnosticsSink, TracingDiagnosticsSink};
use crate::error::{ActionError, ActionResult, SchedulerResult};

/// Builder for every operation variant
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use quiesce_common::sync::OperationBuilder;
///
/// let operation = OperationBuilder::new("flush")
///     .exception_handler(|error| {
///         eprintln!("flush failed: {error}");
///         Ok(())
///     })
///     .build_immediate(|_token| Ok(()))
///     .unwrap();
///
/// operation.run(false).unwrap();
/// assert!(operation.wait_until_idle(Duration::from_secs(1)));
/// ```
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    config: OperationConfig,
    failures_handler: Option<HandlerSlot>,
    sink: Option<Arc<dyn DiagnosticsSink>>,
    runtime: Option<Handle>,
    cancellation: Option<CancellationToken>,
}

#[derive(Clone)]
struct HandlerSlot(ExceptionHandler);

impl std::fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExceptionHandler")
    }
}

impl OperationBuilder {
    /// Start from defaults with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self::from_config(OperationConfig { name: name.into(), ..OperationConfig::default() })
    }

    /// Start from a loaded configuration
    pub fn from_config(config: OperationConfig) -> Self {
        Self { config, failures_handler: None, sink: None, runtime: None, cancellation: None }
    }

    /// Callback for action failures; without one they go to the diagnostics sink
    pub fn exception_handler<H>(mut self, handler: H) -> Self
    where
        H: Fn(&ActionError) -> ActionResult + Send + Sync + 'static,
    {
        self.failures_handler = Some(HandlerSlot(Arc::new(handler)));
        self
    }

    /// Where unhandled and handler failures are reported
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Runtime used for asynchronous dispatch; defaults to the ambient one
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Initial cancellation token
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Delay for delayed operations
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    /// Long-running operations: use the blocking pool instead of a dedicated thread
    pub fn background(mut self, background: bool) -> Self {
        self.config.background = background;
        self
    }

    /// Long-running operations: dedicated worker thread name
    pub fn thread_name<S: Into<String>>(mut self, thread_name: S) -> Self {
        self.config.thread_name = Some(thread_name.into());
        self
    }

    /// Configuration as it stands
    pub fn config(&self) -> &OperationConfig {
        &self.config
    }

    /// Bind `action` to an operation that runs immediately
    pub fn build_immediate<F>(self, action: F) -> SchedulerResult<ImmediateOperation>
    where
        F: Fn(&CancellationToken) -> ActionResult + Send + Sync + 'static,
    {
        self.build_with(action, Immediate)
    }

    /// Bind `action` to an operation that runs after the configured delay
    pub fn build_delayed<F>(self, action: F) -> SchedulerResult<DelayedOperation>
    where
        F: Fn(&CancellationToken) -> ActionResult + Send + Sync + 'static,
    {
        let strategy = Delayed::new(self.config.delay);
        self.build_with(action, strategy)
    }

    /// Bind `action` to an operation that drains on a long-lived worker
    pub fn build_long_running<F>(self, action: F) -> SchedulerResult<LongRunningOperation>
    where
        F: Fn(&CancellationToken) -> ActionResult + Send + Sync + 'static,
    {
        let strategy =
            LongRunning::new(self.config.background, self.config.worker_thread_name());
        self.build_with(action, strategy)
    }

    /// Bind an asynchronous `action` to a task operation
    pub fn build_task<F, Fut>(self, action: F) -> SchedulerResult<TaskOperation>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let (core, failures) = self.into_parts()?;
        Ok(TaskOperation::from_parts(core, AsyncActionRunner::new(action, failures)))
    }

    fn build_with<F, D>(self, action: F, strategy: D) -> SchedulerResult<SynchronizedOperation<D>>
    where
        F: Fn(&CancellationToken) -> ActionResult + Send + Sync + 'static,
        D: super::dispatch::Dispatch,
    {
        let (core, failures) = self.into_parts()?;
        let runner = ActionRunner::new(action, failures);
        Ok(SynchronizedOperation::from_parts(BoundOperation::new(core, runner), strategy))
    }

    fn into_parts(self) -> SchedulerResult<(OperationCore, FailureRouter)> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> (OperationCore, FailureRouter) {
        let runtime = self.runtime.or_else(|| Handle::try_current().ok());
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingDiagnosticsSink));
        let failures = FailureRouter::new(self.failures_handler.map(|slot| slot.0), sink);
        let core =
            OperationCore::new(self.config.name, self.cancellation.unwrap_or_default(), runtime);
        (core, failures)
    }
}

fn defaults() -> OperationBuilder {
    OperationBuilder::from_config(OperationConfig::default())
}

fn ignore_token<F>(action: F) -> impl Fn(&CancellationToken) -> ActionResult + Send + Sync + 'static
where
    F: Fn() -> ActionResult + Send + Sync + 'static,
{
    move |_: &CancellationToken| action()
}

impl SynchronizedOperation<Immediate> {
    /// Immediate operation with default settings
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() -> ActionResult + Send + Sync + 'static,
    {
        Self::from_parts(Self::bound(ignore_token(action), None), Immediate)
    }

    /// Immediate operation whose failures go to `handler`
    pub fn with_handler<F, H>(action: F, handler: H) -> Self
    where
        F: Fn() -> ActionResult + Send + Sync + 'static,
        H: Fn(&ActionError) -> ActionResult + Send + Sync + 'static,
    {
        Self::from_parts(Self::bound(ignore_token(action), Some(Arc::new(handler))), Immediate)
    }

    /// Immediate operation whose action observes the cancellation token
    pub fn cancellable<F>(action: F) -> Self
    where
        F: Fn(&CancellationToken) -> ActionResult + Send + Sync + 'static,
    {
        Self::from_parts(Self::bound(action, None), Immediate)
    }
}

impl SynchronizedOperation<Delayed> {
    /// Delayed operation with default settings
    ///
    /// Unlike [`OperationBuilder::build_delayed`], an out-of-range `delay`
    /// is clamped to [`MAX_DELAY`](crate::config::MAX_DELAY) rather than
    /// rejected.
    pub fn new<F>(action: F, delay: Duration) -> Self
    where
        F: Fn() -> ActionResult + Send + Sync + 'static,
    {
        Self::from_parts(Self::bound(ignore_token(action), None), Delayed::new(delay))
    }
}

impl SynchronizedOperation<LongRunning> {
    /// Long-running operation with default settings
    ///
    /// With `is_background == false` the worker is a dedicated OS thread.
    /// The process does not wait for it on exit.
    pub fn new<F>(action: F, is_background: bool) -> Self
    where
        F: Fn() -> ActionResult + Send + Sync + 'static,
    {
        let config = OperationConfig::default();
        let strategy = LongRunning::new(is_background, config.worker_thread_name());
        Self::from_parts(Self::bound(ignore_token(action), None), strategy)
    }
}

impl<D: super::dispatch::Dispatch> SynchronizedOperation<D> {
    fn bound<F>(action: F, handler: Option<ExceptionHandler>) -> BoundOperation
    where
        F: Fn(&CancellationToken) -> ActionResult + Send + Sync + 'static,
    {
        let mut builder = defaults();
        builder.failures_handler = handler.map(HandlerSlot);
        let (core, failures) = builder.assemble();
        BoundOperation::new(core, ActionRunner::new(action, failures))
    }
}

impl TaskOperation {
    /// Task operation with default settings
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        Self::from_builder(defaults(), action)
    }

    /// Task operation whose failures go to `handler`
    pub fn with_handler<F, Fut, H>(action: F, handler: H) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
        H: Fn(&ActionError) -> ActionResult + Send + Sync + 'static,
    {
        Self::from_builder(defaults().exception_handler(handler), action)
    }

    fn from_builder<F, Fut>(builder: OperationBuilder, action: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let (core, failures) = builder.assemble();
        Self::from_parts(core, AsyncActionRunner::new(action, failures))
    }
}
