//! Collision classification.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome of a pairwise collision test.
///
/// The `Possibly*` variants come from a conservative test and must be
/// retested before their contact point and normal are trusted. The bit
/// layout keeps uncertainty in bit 2 so [`CollisionType::to_certain`] is a
/// mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum CollisionType {
    /// No contact within the queried interval.
    #[default]
    None = 0,
    /// Touching with negligible normal speed (resting or sliding contact).
    Sliding = 1,
    /// Approaching impact.
    Colliding = 2,
    /// Conservative sliding result, needs a retest.
    PossiblySliding = 5,
    /// Conservative impact result, needs a retest.
    PossiblyColliding = 6,
}

const UNCERTAIN_BIT: u8 = 0x4;

impl CollisionType {
    /// Check whether the result came from a conservative bound.
    #[must_use]
    pub const fn is_uncertain(self) -> bool {
        (self as u8) & UNCERTAIN_BIT != 0
    }

    /// Drop the uncertainty, keeping the kind of contact.
    #[must_use]
    pub const fn to_certain(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Sliding | Self::PossiblySliding => Self::Sliding,
            Self::Colliding | Self::PossiblyColliding => Self::Colliding,
        }
    }

    /// Mark a certain result as uncertain.
    #[must_use]
    pub const fn to_uncertain(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Sliding | Self::PossiblySliding => Self::PossiblySliding,
            Self::Colliding | Self::PossiblyColliding => Self::PossiblyColliding,
        }
    }

    /// Check whether any contact was found.
    #[must_use]
    pub const fn is_contact(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Check whether the contact is (possibly) sliding.
    #[must_use]
    pub const fn is_sliding(self) -> bool {
        matches!(self, Self::Sliding | Self::PossiblySliding)
    }
}

impl std::fmt::Display for CollisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Sliding => write!(f, "sliding"),
            Self::Colliding => write!(f, "colliding"),
            Self::PossiblySliding => write!(f, "possibly sliding"),
            Self::PossiblyColliding => write!(f, "possibly colliding"),
        }
    }
}
