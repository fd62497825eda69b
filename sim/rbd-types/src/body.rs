//! Body identity and canonical pair keys.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier for a rigid body in the simulation.
///
/// Identities are handed out by the world in strictly increasing order and
/// are never reused, so they double as a stable, deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BodyId(pub u64);

impl BodyId {
    /// Create a new body ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for BodyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Body({})", self.0)
    }
}

/// Order-independent key for an unordered pair of bodies.
///
/// Only [`make_pair_key`] builds one, so `first <= second` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairKey {
    first: BodyId,
    second: BodyId,
}

impl PairKey {
    /// The smaller identity of the pair.
    #[must_use]
    pub const fn first(self) -> BodyId {
        self.first
    }

    /// The larger identity of the pair.
    #[must_use]
    pub const fn second(self) -> BodyId {
        self.second
    }

    /// Check whether `id` is one of the pair.
    #[must_use]
    pub fn contains(self, id: BodyId) -> bool {
        self.first == id || self.second == id
    }

    /// Given one member of the pair, return the other.
    #[must_use]
    pub fn partner_of(self, id: BodyId) -> Option<BodyId> {
        if self.first == id {
            Some(self.second)
        } else if self.second == id {
            Some(self.first)
        } else {
            None
        }
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}

/// Build the canonical key for the unordered pair `{a, b}`.
#[must_use]
pub fn make_pair_key(a: BodyId, b: BodyId) -> PairKey {
    PairKey {
        first: a.min(b),
        second: a.max(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_id() {
        let id = BodyId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(BodyId::from(42), id);
        assert_eq!(id.to_string(), "Body(42)");
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = BodyId::new(3);
        let b = BodyId::new(11);
        assert_eq!(make_pair_key(a, b), make_pair_key(b, a));

        let key = make_pair_key(b, a);
        assert_eq!(key.first(), a);
        assert_eq!(key.second(), b);
    }

    #[test]
    fn test_pair_key_partner() {
        let key = make_pair_key(BodyId::new(5), BodyId::new(2));
        assert!(key.contains(BodyId::new(2)));
        assert!(!key.contains(BodyId::new(3)));
        assert_eq!(key.partner_of(BodyId::new(2)), Some(BodyId::new(5)));
        assert_eq!(key.partner_of(BodyId::new(5)), Some(BodyId::new(2)));
        assert_eq!(key.partner_of(BodyId::new(9)), None);
    }
}
