//! Error types for the operation scheduler
//!
//! Two kinds of failure flow through this crate and they never mix:
//!
//! 1. **`SchedulerError`**: returned synchronously to the code that triggers
//!    an operation. These are misuse errors (a variant asked to do something
//!    its execution model cannot do), missing-runtime errors, and
//!    configuration errors.
//!
//! 2. **`ActionError`**: produced by the user action (or its exception
//!    handler). These are *never* returned to the trigger caller; they go to
//!    the operation's exception handler or to its
//!    [`DiagnosticsSink`](crate::diagnostics::DiagnosticsSink).
//!
//! ## ErrorClassification
//!
//! `SchedulerError` implements [`ErrorClassification`] so callers can make
//! retry and alerting decisions without matching on variants:
//!
//! | Variant | Severity | Retryable |
//! |---------|----------|-----------|
//! | `InvalidOperation` | Critical | no |
//! | `NoRuntime` | Error | no |
//! | `Spawn` | Error | yes |
//! | `Config` / `ConfigParse` | Error | no |

use std::fmt;

use thiserror::Error;

/// Error raised by a user action or exception handler.
pub type ActionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type returned by user actions and exception handlers.
pub type ActionResult = Result<(), ActionError>;

/// Standard result type for scheduler calls
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors returned to the caller that triggers an operation
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The variant cannot honour the requested call shape
    #[error("Invalid operation '{operation}' on {variant} operation: {reason}")]
    InvalidOperation { operation: &'static str, variant: &'static str, reason: String },

    /// Asynchronous dispatch was requested but no tokio runtime is reachable
    #[error("No tokio runtime available to dispatch operation '{operation}'")]
    NoRuntime { operation: String },

    /// A dedicated execution thread could not be created
    #[error("Failed to spawn worker thread for operation '{operation}'")]
    Spawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid operation configuration
    #[error("Configuration error in field '{field}': {message}")]
    Config { field: String, message: String },

    /// Configuration text could not be parsed
    #[error("Failed to parse operation configuration")]
    ConfigParse(#[from] toml::de::Error),
}

impl SchedulerError {
    /// Create a misuse error for the given call and variant
    pub fn invalid_operation<S: Into<String>>(
        operation: &'static str,
        variant: &'static str,
        reason: S,
    ) -> Self {
        Self::InvalidOperation { operation, variant, reason: reason.into() }
    }

    /// Create a missing-runtime error
    pub fn no_runtime<S: Into<String>>(operation: S) -> Self {
        Self::NoRuntime { operation: operation.into() }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Config { field: field.into(), message: message.into() }
    }
}

impl ErrorClassification for SchedulerError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidOperation { .. } => ErrorSeverity::Critical,
            Self::NoRuntime { .. } | Self::Spawn { .. } => ErrorSeverity::Error,
            Self::Config { .. } | Self::ConfigParse(_) => ErrorSeverity::Error,
        }
    }
}

/// Standard error classification interface
///
/// Provides a uniform way to ask whether an error is worth retrying and how
/// loudly it should be reported.
pub trait ErrorClassification {
    /// Check if this error is retryable
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    ///
    /// Used for monitoring, alerting, and logging decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    ///
    /// For this crate that means a programming error at the call site.
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A panic captured while running an action or exception handler
///
/// Panics are folded into the same failure path as `Err` returns so that a
/// panicking action never unwinds into the scheduler or a worker thread.
#[derive(Debug, Clone, Error)]
#[error("{context} panicked: {message}")]
pub struct ActionPanic {
    /// Which callable panicked (`"action"` or `"exception handler"`)
    pub context: &'static str,
    /// Panic payload rendered as text, when it was a string
    pub message: String,
}

impl ActionPanic {
    /// Build from a `catch_unwind` payload
    pub fn from_payload(context: &'static str, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { context, message }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error classification and panic capture.
    use super::*;

    /// Validates misuse errors are classified as critical and not
    /// retryable.
    #[test]
    fn test_invalid_operation_is_critical() {
        let err = SchedulerError::invalid_operation("run", "delayed", "no sync pending");
        assert!(err.is_critical());
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(
            err.to_string(),
            "Invalid operation 'run' on delayed operation: no sync pending"
        );
    }

    /// Validates spawn failures are the only retryable scheduler error.
    #[test]
    fn test_spawn_is_retryable() {
        let err = SchedulerError::Spawn {
            operation: "refresh".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "out of threads"),
        };
        assert!(err.is_retryable());
        assert!(!SchedulerError::no_runtime("refresh").is_retryable());
        assert!(!SchedulerError::config_field("name", "empty").is_retryable());
    }

    /// Validates severity ordering used by alert thresholds.
    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }

    /// Validates panic payloads of both string kinds are rendered.
    #[test]
    fn test_action_panic_from_payload() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        let captured = ActionPanic::from_payload("action", payload.as_ref());
        assert_eq!(captured.message, "boom");
        assert_eq!(captured.to_string(), "action panicked: boom");

        let payload = std::panic::catch_unwind(|| panic!("{} {}", "formatted", 7)).unwrap_err();
        let captured = ActionPanic::from_payload("exception handler", payload.as_ref());
        assert_eq!(captured.message, "formatted 7");
    }
}
