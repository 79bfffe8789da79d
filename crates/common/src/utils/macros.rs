//! Macros for reducing boilerplate code
//!
//! Small state and mode enums in this crate all render to and parse from
//! lowercase snake-case names (log fields, config values). The macro here
//! generates both directions from a single mapping.

/// Implements `Display` and `FromStr` for a fieldless enum
///
/// - `Display` writes the mapped name.
/// - `FromStr` matches case-insensitively and reports the enum name on
///   failure.
///
/// # Example
///
/// ```rust
/// use quiesce_common::impl_name_conversions;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// pub enum Phase {
///     Idle,
///     Busy,
/// }
///
/// impl_name_conversions!(Phase {
///     Idle => "idle",
///     Busy => "busy",
/// });
///
/// assert_eq!(Phase::Busy.to_string(), "busy");
/// assert_eq!("IDLE".parse::<Phase>(), Ok(Phase::Idle));
/// ```
#[macro_export]
macro_rules! impl_name_conversions {
    ($enum_name:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($name),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
