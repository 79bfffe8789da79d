//! Per-thread stack of suppression scopes
//!
//! Each thread owns an independent stack of [`SuppressionMode`] values. The
//! top of the stack is the effective mode; an empty stack means nothing is
//! suppressed. Pushing returns a [`SuppressionGuard`] that remembers the
//! depth *before* the push, and releasing the guard truncates the stack back
//! to that depth. Frames pushed after the guard (and not yet released) go
//! with it.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use super::SuppressionMode;

thread_local! {
    static SUPPRESSION_STACK: RefCell<Vec<SuppressionMode>> = const { RefCell::new(Vec::new()) };
}

/// Scope token returned by a suppression push
///
/// Dropping the guard releases the scope. `release` can also be called
/// explicitly; only the first release has any effect. The guard is `!Send`
/// because the frame it refers to lives in the creating thread's stack.
#[derive(Debug)]
#[must_use = "suppression ends as soon as the guard is dropped"]
pub struct SuppressionGuard {
    depth: usize,
    mode: SuppressionMode,
    released: Cell<bool>,
    _not_send: PhantomData<*const ()>,
}

impl SuppressionGuard {
    /// Stack depth this guard restores on release
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Mode this guard pushed
    pub fn mode(&self) -> SuppressionMode {
        self.mode
    }

    /// Whether the guard has already been released
    pub fn is_released(&self) -> bool {
        self.released.get()
    }

    /// Release the scope, popping every frame at or above the recorded depth
    ///
    /// Releasing an already-released guard does nothing, and releasing a
    /// guard whose frames were already popped by an outer guard leaves the
    /// stack untouched.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        let depth = self.depth;
        // `try_with` tolerates release during thread-local teardown.
        let _ = SUPPRESSION_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.len() > depth {
                stack.truncate(depth);
            }
        });
    }
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Push `mode` onto the calling thread's suppression stack
pub fn push_suppression(mode: SuppressionMode) -> SuppressionGuard {
    let depth = SUPPRESSION_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(mode);
        depth
    });
    SuppressionGuard { depth, mode, released: Cell::new(false), _not_send: PhantomData }
}

/// Suppress every diagnostic message until the guard is released
pub fn suppress_all_messages() -> SuppressionGuard {
    push_suppression(SuppressionMode::All)
}

/// Suppress first-chance failure notifications until the guard is released
pub fn suppress_first_chance_only() -> SuppressionGuard {
    push_suppression(SuppressionMode::FirstChanceOnly)
}

/// Re-enable diagnostics inside an outer suppression scope
pub fn override_suppression() -> SuppressionGuard {
    push_suppression(SuppressionMode::None)
}

/// Effective mode for the calling thread
pub fn current_mode() -> SuppressionMode {
    SUPPRESSION_STACK
        .try_with(|stack| stack.borrow().last().copied().unwrap_or_default())
        .unwrap_or_default()
}

/// Number of active frames on the calling thread
pub fn depth() -> usize {
    SUPPRESSION_STACK.try_with(|stack| stack.borrow().len()).unwrap_or(0)
}

/// True when the top frame is [`SuppressionMode::All`]
pub fn should_suppress_all() -> bool {
    current_mode().suppresses_all()
}

/// True when the top frame is [`SuppressionMode::FirstChanceOnly`] or stronger
pub fn should_suppress_first_chance() -> bool {
    current_mode().suppresses_first_chance()
}
