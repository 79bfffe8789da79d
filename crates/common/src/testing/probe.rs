//! Concurrency probe for actions under test
//!
//! Wrap the body of an action in [`ConcurrencyProbe::enter`] to record how
//! many executions overlapped at any point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
    entries: AtomicUsize,
}

/// Records entries and peak overlap of a guarded region
///
/// Cloning shares the counters.
///
/// ```rust
/// use quiesce_common::testing::ConcurrencyProbe;
///
/// let probe = ConcurrencyProbe::new();
/// {
///     let _outer = probe.enter();
///     let _inner = probe.enter();
///     assert_eq!(probe.active(), 2);
/// }
/// assert_eq!(probe.peak(), 2);
/// assert_eq!(probe.entries(), 2);
/// assert_eq!(probe.active(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    counters: Arc<Counters>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of one execution; the returned guard marks its end
    pub fn enter(&self) -> ProbeGuard {
        let counters = &self.counters;
        counters.entries.fetch_add(1, Ordering::SeqCst);
        let now_active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak.fetch_max(now_active, Ordering::SeqCst);
        ProbeGuard { counters: Arc::clone(&self.counters) }
    }

    /// Executions currently inside the region
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest overlap observed
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    /// Total executions that entered the region
    pub fn entries(&self) -> usize {
        self.counters.entries.load(Ordering::SeqCst)
    }
}

/// Leaves the probed region when dropped
#[derive(Debug)]
#[must_use = "the region ends when the guard is dropped"]
pub struct ProbeGuard {
    counters: Arc<Counters>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}
