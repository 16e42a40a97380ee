//! Shutdown priority levels.

use std::fmt;

/// Priority bucket for a shutdown callback. Lower levels run first.
///
/// User code builds levels with [`ShutdownLevel::user`]; the default is level
/// `0`. A reserved top-priority level sorts before every user level and is
/// only reachable through a [`ShutdownRegistrar`](crate::ShutdownRegistrar),
/// so user callbacks can never be scheduled alongside server teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ShutdownLevel(Rank);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Rank {
    // Declared first so it orders below every user level.
    TopPriority,
    User(u32),
}

impl Default for Rank {
    fn default() -> Self {
        Self::User(0)
    }
}

impl ShutdownLevel {
    /// A user level. `ShutdownLevel::user(0)` runs before `ShutdownLevel::user(1)`.
    pub const fn user(level: u32) -> Self {
        Self(Rank::User(level))
    }

    pub(crate) const fn top_priority() -> Self {
        Self(Rank::TopPriority)
    }

    /// Returns `true` for the level reserved for server teardown.
    pub const fn is_top_priority(&self) -> bool {
        matches!(self.0, Rank::TopPriority)
    }
}

impl From<u32> for ShutdownLevel {
    fn from(level: u32) -> Self {
        Self::user(level)
    }
}

impl fmt::Display for ShutdownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Rank::TopPriority => f.write_str("top-priority"),
            Rank::User(level) => write!(f, "{level}"),
        }
    }
}
