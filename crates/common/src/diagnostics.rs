//! Suppressed-failure reporting
//!
//! Failures inside an operation's action are never returned to the caller
//! that triggered it. When no exception handler takes them (or the handler
//! itself fails) they are reported to a [`DiagnosticsSink`]. The sink is
//! injected into each operation instead of living in a process-wide static,
//! so tests can observe reports with [`RecordingDiagnosticsSink`].

use std::fmt::{self, Debug};
use std::sync::{Arc, Mutex};

use tracing::error;

use crate::error::ActionError;
use crate::suppression;

/// An action failure that nothing downstream recovered from
///
/// When the exception handler also failed, both errors are retained: the
/// action error stays the primary cause and the handler error is attached.
#[derive(Debug)]
pub struct SuppressedFailure {
    /// Name of the operation whose action failed
    pub operation: String,
    /// Error produced by the action
    pub action_error: ActionError,
    /// Error produced by the exception handler while handling `action_error`
    pub handler_error: Option<ActionError>,
}

impl SuppressedFailure {
    /// Failure with no handler involved
    pub fn unhandled<S: Into<String>>(operation: S, action_error: ActionError) -> Self {
        Self { operation: operation.into(), action_error, handler_error: None }
    }

    /// Failure where the exception handler failed as well
    pub fn handler_failed<S: Into<String>>(
        operation: S,
        action_error: ActionError,
        handler_error: ActionError,
    ) -> Self {
        Self { operation: operation.into(), action_error, handler_error: Some(handler_error) }
    }

    /// Whether the exception handler failed while handling the action error
    pub fn is_handler_failure(&self) -> bool {
        self.handler_error.is_some()
    }
}

impl fmt::Display for SuppressedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.handler_error {
            Some(handler_error) => write!(
                f,
                "Operation '{}' failed: {}; exception handler failed: {}",
                self.operation, self.action_error, handler_error
            ),
            None => write!(f, "Operation '{}' failed: {}", self.operation, self.action_error),
        }
    }
}

impl std::error::Error for SuppressedFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.action_error.as_ref())
    }
}

/// Channel for failures that were swallowed on the way back to the caller
///
/// Implementations must not panic; they run on whichever thread executed
/// the action.
pub trait DiagnosticsSink: Send + Sync + Debug {
    /// Report a suppressed failure
    fn report(&self, failure: SuppressedFailure);
}

/// Logs suppressed failures through `tracing`
///
/// Honours the calling thread's suppression stack: nothing is logged while
/// [`suppression::should_suppress_all`] is true.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnosticsSink;

impl DiagnosticsSink for TracingDiagnosticsSink {
    fn report(&self, failure: SuppressedFailure) {
        if suppression::should_suppress_all() {
            return;
        }
        match &failure.handler_error {
            Some(handler_error) => error!(
                operation = %failure.operation,
                action_error = %failure.action_error,
                handler_error = %handler_error,
                "Exception handler failed while handling action error"
            ),
            None => error!(
                operation = %failure.operation,
                action_error = %failure.action_error,
                "Unhandled action error"
            ),
        }
    }
}

/// No-op sink for callers that deliberately ignore failures
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDiagnosticsSink;

impl DiagnosticsSink for NoOpDiagnosticsSink {
    fn report(&self, _failure: SuppressedFailure) {
        // Intentionally empty
    }
}

/// Sink that keeps every report in memory
///
/// Cloning shares the underlying buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingDiagnosticsSink {
    reports: Arc<Mutex<Vec<SuppressedFailure>>>,
}

impl RecordingDiagnosticsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reports received so far
    pub fn len(&self) -> usize {
        self.with_reports(|reports| reports.len())
    }

    /// Whether no reports have been received
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rendered messages of every report, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.with_reports(|reports| reports.iter().map(ToString::to_string).collect())
    }

    /// Remove and return every report
    pub fn take(&self) -> Vec<SuppressedFailure> {
        match self.reports.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    fn with_reports<T>(&self, f: impl FnOnce(&[SuppressedFailure]) -> T) -> T {
        match self.reports.lock() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

impl DiagnosticsSink for RecordingDiagnosticsSink {
    fn report(&self, failure: SuppressedFailure) {
        match self.reports.lock() {
            Ok(mut guard) => guard.push(failure),
            Err(poisoned) => poisoned.into_inner().push(failure),
        }
    }
}

impl<T: DiagnosticsSink + ?Sized> DiagnosticsSink for Arc<T> {
    fn report(&self, failure: SuppressedFailure) {
        (**self).report(failure);
    }
}
