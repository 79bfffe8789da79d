//! Testing utilities for code built on synchronized operations
//!
//! - **[`async_utils`]**: bounded polling and the
//!   [`assert_eventually_async!`](crate::assert_eventually_async) macro
//! - **[`probe`]**: [`ConcurrencyProbe`] for checking at-most-one execution
//! - **`logging`**: [`init_test_tracing`] (requires `test-utils`)
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use quiesce_common::sync::ImmediateOperation;
//! use quiesce_common::testing::ConcurrencyProbe;
//!
//! let probe = ConcurrencyProbe::new();
//! let inside = probe.clone();
//! let operation = Arc::new(ImmediateOperation::new(move || {
//!     let _guard = inside.enter();
//!     Ok(())
//! }));
//!
//! operation.run(true).unwrap();
//! assert_eq!(probe.peak(), 1);
//! ```

pub mod async_utils;
pub mod probe;
#[cfg(any(feature = "test-utils", test))]
pub mod logging;

pub use async_utils::{poll_until, poll_until_blocking, DEFAULT_POLL_INTERVAL};
pub use probe::{ConcurrencyProbe, ProbeGuard};
#[cfg(any(feature = "test-utils", test))]
pub use logging::init_test_tracing;
