//! Suppression levels

/// How much diagnostic output a suppression scope silences
///
/// Levels are ordered: a stronger mode implies every weaker one, so
/// `All` also suppresses first-chance notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SuppressionMode {
    /// Nothing is suppressed (also used to override an outer scope)
    #[default]
    None,
    /// Only first-chance failure notifications are suppressed
    FirstChanceOnly,
    /// All diagnostic messages are suppressed
    All,
}

impl_name_conversions!(SuppressionMode {
    None => "none",
    FirstChanceOnly => "first_chance_only",
    All => "all",
});

impl SuppressionMode {
    /// Whether this mode silences first-chance notifications
    pub fn suppresses_first_chance(self) -> bool {
        self >= Self::FirstChanceOnly
    }

    /// Whether this mode silences every diagnostic message
    pub fn suppresses_all(self) -> bool {
        self == Self::All
    }
}
