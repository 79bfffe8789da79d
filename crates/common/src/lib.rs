//! Synchronized-operation scheduling and scoped diagnostic suppression.
//!
//! The core of this crate is [`sync::SynchronizedOperation`]: a bound action
//! that never runs concurrently with itself and folds repeated triggers into
//! a single deferred re-run. Alongside it, [`suppression`] provides a
//! per-thread stack of scopes that quiet the scheduler's diagnostic output.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors, configuration, suppression scopes
//! - `observability`: the tracing-backed diagnostics sink
//! - `runtime` (default): the operation scheduler and test helpers
//! - `test-utils`: test log initialisation for downstream crates

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
// `utils` first: its macros are used by the modules below.
#[cfg(feature = "foundation")]
#[macro_use]
pub mod utils;
#[cfg(feature = "foundation")]
pub mod config;
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod suppression;

// Observability tier
// -----------------------------------------------------------------
#[cfg(feature = "observability")]
pub mod diagnostics;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod sync;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "runtime", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use config::{OperationConfig, OperationConfigBuilder};
#[cfg(feature = "observability")]
pub use diagnostics::{
    DiagnosticsSink, NoOpDiagnosticsSink, RecordingDiagnosticsSink, SuppressedFailure,
    TracingDiagnosticsSink,
};
#[cfg(feature = "foundation")]
pub use error::{
    ActionError, ActionPanic, ActionResult, ErrorClassification, ErrorSeverity, SchedulerError,
    SchedulerResult,
};
#[cfg(feature = "foundation")]
pub use suppression::{SuppressionGuard, SuppressionMode};
#[cfg(feature = "runtime")]
pub use sync::{
    CancellationToken, DelayedOperation, ImmediateOperation, LongRunningOperation,
    OperationBuilder, OperationState, SynchronizedOperation, TaskOperation,
};
#[cfg(feature = "foundation")]
pub use utils::serde::duration_millis;
