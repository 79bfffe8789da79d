//! Scoped suppression of diagnostic messages
//!
//! Code that expects failures (probing, best-effort cleanup) can silence the
//! scheduler's diagnostic output for the duration of a call region:
//!
//! ```rust
//! use quiesce_common::suppression::{self, SuppressionMode};
//!
//! {
//!     let _quiet = suppression::suppress_all_messages();
//!     assert!(suppression::should_suppress_all());
//!
//!     let _loud = suppression::override_suppression();
//!     assert_eq!(suppression::current_mode(), SuppressionMode::None);
//! }
//! assert_eq!(suppression::depth(), 0);
//! ```
//!
//! - **[`mode`]**: the ordered suppression levels
//! - **[`stack`]**: the per-thread stack and its scope guards

pub mod mode;
pub mod stack;

pub use mode::SuppressionMode;
pub use stack::{
    current_mode, depth, override_suppression, push_suppression, should_suppress_all,
    should_suppress_first_chance, suppress_all_messages, suppress_first_chance_only,
    SuppressionGuard,
};
