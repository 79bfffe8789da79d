//! Guarded execution of user actions
//!
//! A runner owns the bound action and routes its failures. Failures are an
//! `Err` return or a panic; both take the same path:
//!
//! 1. a first-chance `debug!` event (unless the thread suppresses it),
//! 2. the exception handler, if one is bound,
//! 3. otherwise, or if the handler fails too, the diagnostics sink.
//!
//! Nothing escapes to the caller that triggered the operation.

use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::diagnostics::{DiagnosticsSink, SuppressedFailure};
use crate::error::{ActionError, ActionPanic, ActionResult};
use crate::suppression;

/// Synchronous action bound to an operation
pub type SyncAction = Box<dyn Fn(&CancellationToken) -> ActionResult + Send + Sync>;

/// Asynchronous action bound to a task operation
pub type AsyncAction =
    Box<dyn Fn(CancellationToken) -> BoxFuture<'static, ActionResult> + Send + Sync>;

/// Callback that receives action failures
pub type ExceptionHandler = Arc<dyn Fn(&ActionError) -> ActionResult + Send + Sync>;

fn panic_error(context: &'static str, payload: &(dyn std::any::Any + Send)) -> ActionError {
    Box::new(ActionPanic::from_payload(context, payload))
}

/// Routes action failures to the handler or the diagnostics sink
#[derive(Clone)]
pub struct FailureRouter {
    handler: Option<ExceptionHandler>,
    sink: Arc<dyn DiagnosticsSink>,
}

impl fmt::Debug for FailureRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureRouter")
            .field("has_handler", &self.handler.is_some())
            .field("sink", &self.sink)
            .finish()
    }
}

impl FailureRouter {
    pub fn new(handler: Option<ExceptionHandler>, sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { handler, sink }
    }

    /// Whether an exception handler is bound
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Handle one action failure
    pub fn route(&self, operation: &str, error: ActionError) {
        if !suppression::should_suppress_first_chance() {
            debug!(operation = %operation, error = %error, "First-chance action failure");
        }

        let Some(handler) = &self.handler else {
            self.sink.report(SuppressedFailure::unhandled(operation, error));
            return;
        };

        let handled = catch_unwind(AssertUnwindSafe(|| handler(&error)))
            .unwrap_or_else(|payload| Err(panic_error("exception handler", payload.as_ref())));

        if let Err(handler_error) = handled {
            self.sink.report(SuppressedFailure::handler_failed(operation, error, handler_error));
        }
    }
}

/// Runs a synchronous action inside a guarded region
pub struct ActionRunner {
    action: SyncAction,
    failures: FailureRouter,
}

impl fmt::Debug for ActionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRunner").field("failures", &self.failures).finish_non_exhaustive()
    }
}

impl ActionRunner {
    pub fn new<F>(action: F, failures: FailureRouter) -> Self
    where
        F: Fn(&CancellationToken) -> ActionResult + Send + Sync + 'static,
    {
        Self { action: Box::new(action), failures }
    }

    /// Execute the action once; returns `true` if it succeeded
    pub fn execute(&self, operation: &str, token: &CancellationToken) -> bool {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.action)(token)))
            .unwrap_or_else(|payload| Err(panic_error("action", payload.as_ref())));

        match outcome {
            Ok(()) => true,
            Err(error) => {
                self.failures.route(operation, error);
                false
            }
        }
    }
}

/// Runs an asynchronous action, awaiting its future inside a guarded region
pub struct AsyncActionRunner {
    action: AsyncAction,
    failures: FailureRouter,
}

impl fmt::Debug for AsyncActionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncActionRunner").field("failures", &self.failures).finish_non_exhaustive()
    }
}

impl AsyncActionRunner {
    pub fn new<F, Fut>(action: F, failures: FailureRouter) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        Self { action: Box::new(move |token| action(token).boxed()), failures }
    }

    /// Execute the action once and await it; returns `true` if it succeeded
    pub async fn execute(&self, operation: &str, token: CancellationToken) -> bool {
        let outcome = match catch_unwind(AssertUnwindSafe(|| (self.action)(token))) {
            Ok(future) => AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panic_error("action", payload.as_ref()))),
            Err(payload) => Err(panic_error("action", payload.as_ref())),
        };

        match outcome {
            Ok(()) => true,
            Err(error) => {
                self.failures.route(operation, error);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for action runners and failure routing.
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::diagnostics::RecordingDiagnosticsSink;

    fn router(
        handler: Option<ExceptionHandler>,
    ) -> (FailureRouter, RecordingDiagnosticsSink) {
        let sink = RecordingDiagnosticsSink::new();
        (FailureRouter::new(handler, Arc::new(sink.clone())), sink)
    }

    /// Validates a successful action reports success and nothing else.
    #[test]
    fn test_success() {
        let (failures, sink) = router(None);
        let runner = ActionRunner::new(|_| Ok(()), failures);
        assert!(runner.execute("op", &CancellationToken::new()));
        assert!(sink.is_empty());
    }

    /// Validates an unhandled error reaches the sink.
    #[test]
    fn test_unhandled_error_reaches_sink() {
        let (failures, sink) = router(None);
        let runner = ActionRunner::new(|_| Err("broken".into()), failures);
        assert!(!runner.execute("op", &CancellationToken::new()));
        assert_eq!(sink.messages(), vec!["Operation 'op' failed: broken".to_string()]);
    }

    /// Validates a handler that succeeds keeps the sink empty.
    #[test]
    fn test_handler_absorbs_error() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let handler: ExceptionHandler = Arc::new(move |error: &ActionError| -> ActionResult {
            assert_eq!(error.to_string(), "broken");
            seen_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let (failures, sink) = router(Some(handler));
        let runner = ActionRunner::new(|_| Err("broken".into()), failures);

        assert!(!runner.execute("op", &CancellationToken::new()));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(sink.is_empty());
    }

    /// Validates a panicking handler is reported with both errors.
    #[test]
    fn test_handler_panic_reported_with_both_errors() {
        let handler: ExceptionHandler =
            Arc::new(|_: &ActionError| -> ActionResult { panic!("handler exploded") });
        let (failures, sink) = router(Some(handler));
        let runner = ActionRunner::new(|_| Err("broken".into()), failures);

        runner.execute("op", &CancellationToken::new());
        let reports = sink.take();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].action_error.to_string(), "broken");
        assert_eq!(
            reports[0].handler_error.as_ref().map(ToString::to_string).as_deref(),
            Some("exception handler panicked: handler exploded")
        );
    }

    /// Validates a panicking action is captured as a failure.
    #[test]
    fn test_action_panic_is_captured() {
        let (failures, sink) = router(None);
        let runner = ActionRunner::new(|_| panic!("action exploded"), failures);
        assert!(!runner.execute("op", &CancellationToken::new()));
        assert_eq!(
            sink.messages(),
            vec!["Operation 'op' failed: action panicked: action exploded".to_string()]
        );
    }

    /// Validates the token passed to the action is the one supplied.
    #[test]
    fn test_token_passed_through() {
        let (failures, _sink) = router(None);
        let runner = ActionRunner::new(
            |token| if token.is_cancelled() { Err("cancelled".into()) } else { Ok(()) },
            failures,
        );
        let token = CancellationToken::new();
        assert!(runner.execute("op", &token));
        token.cancel();
        assert!(!runner.execute("op", &token));
    }

    /// Validates async failures and panics take the same route.
    #[tokio::test]
    async fn test_async_runner_failures() {
        let (failures, sink) = router(None);
        let runner = AsyncActionRunner::new(
            |token: CancellationToken| async move {
                if token.is_cancelled() {
                    panic!("late panic");
                }
                Err::<(), ActionError>("async broken".into())
            },
            failures,
        );

        assert!(!runner.execute("task", CancellationToken::new()).await);
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(!runner.execute("task", cancelled).await);

        assert_eq!(
            sink.messages(),
            vec![
                "Operation 'task' failed: async broken".to_string(),
                "Operation 'task' failed: action panicked: late panic".to_string(),
            ]
        );
    }
}
