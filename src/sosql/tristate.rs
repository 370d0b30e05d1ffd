//! Three-valued (Kleene) logic

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

/// Truth value that may not be known until the network is probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tristate {
    False,
    Unknown,
    True,
}

impl Tristate {
    pub const ALL: [Tristate; 3] = [Tristate::False, Tristate::Unknown, Tristate::True];

    #[inline]
    pub fn is_definite(self) -> bool {
        self != Tristate::Unknown
    }

    #[inline]
    pub fn is_true(self) -> bool {
        self == Tristate::True
    }

    #[inline]
    pub fn is_false(self) -> bool {
        self == Tristate::False
    }
}

impl From<bool> for Tristate {
    #[inline]
    fn from(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }
}

impl BitAnd for Tristate {
    type Output = Tristate;

    fn bitand(self, rhs: Tristate) -> Tristate {
        match (self, rhs) {
            (Tristate::False, _) | (_, Tristate::False) => Tristate::False,
            (Tristate::True, Tristate::True) => Tristate::True,
            _ => Tristate::Unknown,
        }
    }
}

impl BitOr for Tristate {
    type Output = Tristate;

    fn bitor(self, rhs: Tristate) -> Tristate {
        match (self, rhs) {
            (Tristate::True, _) | (_, Tristate::True) => Tristate::True,
            (Tristate::False, Tristate::False) => Tristate::False,
            _ => Tristate::Unknown,
        }
    }
}

impl Not for Tristate {
    type Output = Tristate;

    fn not(self) -> Tristate {
        match self {
            Tristate::False => Tristate::True,
            Tristate::Unknown => Tristate::Unknown,
            Tristate::True => Tristate::False,
        }
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tristate::False => "FALSE",
            Tristate::Unknown => "UNKNOWN",
            Tristate::True => "TRUE",
        })
    }
}
