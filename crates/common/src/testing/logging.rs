//! Test log output
//!
//! Scheduler failures surface as `tracing` events. Call
//! [`init_test_tracing`] at the top of a test to see them; `RUST_LOG`
//! controls the filter and defaults to `quiesce_common=debug`.

use tracing_subscriber::EnvFilter;

const DEFAULT_TEST_FILTER: &str = "quiesce_common=debug";

/// Install a test-writer subscriber once per process
///
/// Safe to call from every test; later calls are no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .with_target(true)
        .try_init();
}
