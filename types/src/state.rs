//! Promise settlement state.

use std::fmt;

/// Observable settlement state of a promise.
///
/// `Pending` is the only non-terminal state. Once a promise reports
/// `Fulfilled` or `Rejected` it never reports anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Pending,
    Fulfilled,
    Rejected,
}

impl State {
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, State::Pending)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Fulfilled => "fulfilled",
            State::Rejected => "rejected",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
