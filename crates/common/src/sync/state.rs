//! Tri-state run flag
//!
//! The whole coalescing protocol rests on one atomic byte:
//!
//! ```text
//!   NotRunning --trigger--> Running --trigger--> RunningAndPending
//!        ^                    |  ^                      |
//!        +-----complete-------+  +-------complete-------+
//!                                   (action runs again)
//! ```
//!
//! Every transition is a compare-and-swap. No lock is ever held while the
//! action runs, so an action may re-trigger its own operation.

use std::sync::atomic::{AtomicU8, Ordering};

/// Observable run state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationState {
    /// Idle; the next trigger starts an execution
    NotRunning = 0,
    /// An execution is in flight (or scheduled) and nothing else is queued
    Running = 1,
    /// An execution is in flight and at least one trigger arrived since it
    /// started; exactly one more execution will follow
    RunningAndPending = 2,
}

impl_name_conversions!(OperationState {
    NotRunning => "not_running",
    Running => "running",
    RunningAndPending => "running_and_pending",
});

impl OperationState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::NotRunning,
            1 => Self::Running,
            _ => Self::RunningAndPending,
        }
    }

    /// Whether an execution is in flight or scheduled
    pub fn is_running(self) -> bool {
        self != Self::NotRunning
    }

    /// Whether a re-run has been requested
    pub fn is_pending(self) -> bool {
        self == Self::RunningAndPending
    }
}

/// Result of a coalescing trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The operation was idle; the caller now owns the execution
    Started,
    /// The operation was busy; the request was folded into the pending flag
    Coalesced,
}

/// Atomic storage for [`OperationState`]
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(OperationState::NotRunning as u8))
    }

    /// Snapshot of the current state
    pub fn load(&self) -> OperationState {
        OperationState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Start if idle, otherwise mark pending
    pub fn trigger(&self) -> Trigger {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = match OperationState::from_raw(current) {
                OperationState::NotRunning => OperationState::Running,
                OperationState::Running => OperationState::RunningAndPending,
                OperationState::RunningAndPending => return Trigger::Coalesced,
            };
            match self.0.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) if next == OperationState::Running => return Trigger::Started,
                Ok(_) => return Trigger::Coalesced,
                Err(actual) => current = actual,
            }
        }
    }

    /// Start only if idle; never marks pending
    pub fn try_start(&self) -> bool {
        self.0
            .compare_exchange(
                OperationState::NotRunning as u8,
                OperationState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Finish one execution
    ///
    /// Consumes the pending flag if set and returns `true`, meaning the
    /// caller must execute again. Otherwise returns to `NotRunning` and
    /// returns `false`.
    pub fn complete(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let (next, run_again) = match OperationState::from_raw(current) {
                OperationState::RunningAndPending => (OperationState::Running, true),
                OperationState::Running => (OperationState::NotRunning, false),
                OperationState::NotRunning => return false,
            };
            match self.0.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return run_again,
                Err(actual) => current = actual,
            }
        }
    }

    /// Force the state back to `NotRunning`, returning what it was
    ///
    /// Only used when a scheduled execution can no longer happen.
    pub fn reset(&self) -> OperationState {
        OperationState::from_raw(self.0.swap(OperationState::NotRunning as u8, Ordering::AcqRel))
    }
}
