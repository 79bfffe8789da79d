//! Synchronized operations
//!
//! An operation binds an action and guarantees that it never runs
//! concurrently with itself. Triggers that arrive while it runs are
//! coalesced: however many there are, exactly one more execution follows.
//!
//! ## Submodules
//!
//! - **`state`**: the tri-state run flag and its atomic transitions
//! - **`core`**: shared state machine, cancellation token, idle signalling
//! - **`runner`**: guarded action execution and failure routing
//! - **`dispatch`**: where asynchronous executions run ([`Immediate`],
//!   [`Delayed`], [`LongRunning`])
//! - **`operation`**: [`SynchronizedOperation`] for synchronous actions
//! - **`task`**: [`TaskOperation`] for asynchronous actions
//! - **`builder`**: [`OperationBuilder`] and the short constructors
//!
//! ## Variants
//!
//! | Type | `run(false)` | `run(true)` | `run_async()` |
//! |------|--------------|-------------|---------------|
//! | [`ImmediateOperation`] | caller thread | waits for idle | blocking pool |
//! | [`DelayedOperation`] | caller thread | error | blocking pool after delay |
//! | [`LongRunningOperation`] | caller thread | waits for idle | dedicated worker |
//! | [`TaskOperation`] | spawned task | error | awaited inline |

pub mod builder;
pub mod core;
pub mod dispatch;
pub mod operation;
pub mod runner;
pub mod state;
pub mod task;

pub use builder::OperationBuilder;
pub use dispatch::{Delayed, Dispatch, Immediate, LongRunning};
pub use operation::{
    DelayedOperation, ImmediateOperation, LongRunningOperation, SynchronizedOperation,
};
pub use runner::{ActionRunner, AsyncActionRunner, ExceptionHandler, FailureRouter};
pub use state::{OperationState, Trigger};
pub use task::TaskOperation;

// Re-export the token type actions receive
pub use tokio_util::sync::CancellationToken;
