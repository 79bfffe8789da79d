//! Common utility functions and helper macros
//!
//! - **[`macros`]**: name conversions for small state enums
//! - **[`serde`]**: serialization helpers for config types

#[macro_use]
pub mod macros;
pub mod serde;

pub use self::serde::duration_millis;
