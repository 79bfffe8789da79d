//! Async test helpers
//!
//! Scheduler tests mostly wait for something that happens on another
//! thread: an execution to start, a counter to settle, an operation to go
//! idle. These helpers turn those waits into bounded polls.

#![allow(clippy::missing_panics_doc)]

use std::future::Future;
use std::time::{Duration, Instant};

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Assert that an async condition becomes true within a timeout
///
/// # Examples
///
/// ```no_run
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use quiesce_common::sync::ImmediateOperation;
///
/// #[tokio::test(flavor = "multi_thread")]
/// async fn test_dispatch_runs() {
///     let runs = Arc::new(AtomicUsize::new(0));
///     let counter = Arc::clone(&runs);
///     let operation = ImmediateOperation::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     });
///
///     operation.run_async().unwrap();
///     quiesce_common::assert_eventually_async!(Duration::from_secs(1), async {
///         runs.load(Ordering::SeqCst) == 1
///     });
/// }
/// ```
#[macro_export]
macro_rules! assert_eventually_async {
    ($timeout:expr, $fut:expr) => {{
        let limit = $timeout;
        let settled = tokio::time::timeout(limit, async {
            loop {
                if $fut.await {
                    break;
                }
                tokio::time::sleep($crate::testing::async_utils::DEFAULT_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok();
        assert!(settled, "Condition did not become true within {:?}", limit);
    }};
}

/// Poll an async condition until it returns true or `timeout` elapses
///
/// The condition is always evaluated at least once. Returns whether it
/// was observed true.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Blocking variant of [`poll_until`] for tests without a runtime
pub fn poll_until_blocking<F>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for testing::async_utils.
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Validates polling observes a flag set by another task.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_poll_until_succeeds() {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag_clone.store(true, Ordering::SeqCst);
        });

        let settled = poll_until(Duration::from_secs(1), DEFAULT_POLL_INTERVAL, || {
            let flag = Arc::clone(&flag);
            async move { flag.load(Ordering::SeqCst) }
        })
        .await;
        assert!(settled);
    }

    /// Validates polling gives up after the timeout.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_poll_until_times_out() {
        let settled =
            poll_until(Duration::from_millis(30), DEFAULT_POLL_INTERVAL, || async { false }).await;
        assert!(!settled);
    }

    /// Validates a zero timeout still evaluates the condition once.
    #[test]
    fn test_poll_until_blocking_checks_once() {
        let calls = AtomicUsize::new(0);
        let settled = poll_until_blocking(Duration::ZERO, DEFAULT_POLL_INTERVAL, || {
            calls.fetch_add(1, Ordering::SeqCst);
            true
        });
        assert!(settled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Validates the assertion macro passes once the condition holds.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_assert_eventually_async() {
        let count = Arc::new(AtomicUsize::new(0));
        let writer = Arc::clone(&count);
        tokio::spawn(async move {
            for _ in 0..3 {
                writer.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        crate::assert_eventually_async!(Duration::from_secs(1), async {
            count.load(Ordering::SeqCst) == 3
        });
    }
}
