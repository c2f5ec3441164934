//! Compile-time field handles and the modified-field set
//!
//! Entity types declare their tracked fields as associated constants:
//!
//! ```
//! use graphdelta_core::model::FieldId;
//!
//! struct Order;
//! impl Order {
//!     pub const ORDER_ID: FieldId = FieldId::new(0);
//!     pub const FREIGHT: FieldId = FieldId::new(1);
//! }
//! ```
//!
//! Names are resolved through the type's [`EntitySchema`](super::EntitySchema).

use serde::{Deserialize, Serialize};

/// Ordinal of a tracked field within its entity schema (0..=63)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(u8);

impl FieldId {
    /// Highest usable ordinal; a [`FieldSet`] is 64 bits wide
    pub const MAX_ORDINAL: u8 = 63;

    /// Declare a field handle. Panics at compile time (in const context)
    /// when the ordinal does not fit a [`FieldSet`].
    pub const fn new(ordinal: u8) -> Self {
        assert!(ordinal <= Self::MAX_ORDINAL, "field ordinal out of range");
        Self(ordinal)
    }

    pub const fn ordinal(self) -> u8 {
        self.0
    }

    const fn bit(self) -> u64 {
        1u64 << self.0
    }
}

/// Set of modified fields, stored as a bitset
///
/// Serializes as the raw `u64` so the set travels with the node as
/// ordinary data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet(u64);

impl FieldSet {
    pub const EMPTY: FieldSet = FieldSet(0);

    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Build a set from a list of fields (usable in `static` schemas)
    pub const fn of(fields: &[FieldId]) -> Self {
        let mut bits = 0u64;
        let mut i = 0;
        while i < fields.len() {
            bits |= fields[i].bit();
            i += 1;
        }
        Self(bits)
    }

    /// The first `count` ordinals
    pub const fn first(count: usize) -> Self {
        if count >= 64 {
            Self(u64::MAX)
        } else {
            Self((1u64 << count) - 1)
        }
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn contains(self, field: FieldId) -> bool {
        self.0 & field.bit() != 0
    }

    /// Insert a field; returns `true` when it was not present yet
    pub fn insert(&mut self, field: FieldId) -> bool {
        let fresh = !self.contains(field);
        self.0 |= field.bit();
        fresh
    }

    pub fn remove(&mut self, field: FieldId) -> bool {
        let present = self.contains(field);
        self.0 &= !field.bit();
        present
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    #[must_use]
    pub const fn union(self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 | other.0)
    }

    #[must_use]
    pub const fn intersection(self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 & other.0)
    }

    #[must_use]
    pub const fn difference(self, other: FieldSet) -> FieldSet {
        FieldSet(self.0 & !other.0)
    }

    /// Fields in ascending ordinal order
    pub fn iter(self) -> impl Iterator<Item = FieldId> {
        (0..=FieldId::MAX_ORDINAL)
            .filter(move |ordinal| self.0 & (1u64 << ordinal) != 0)
            .map(FieldId)
    }
}

impl FromIterator<FieldId> for FieldSet {
    fn from_iter<I: IntoIterator<Item = FieldId>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for field in iter {
            set.insert(field);
        }
        set
    }
}

impl Extend<FieldId> for FieldSet {
    fn extend<I: IntoIterator<Item = FieldId>>(&mut self, iter: I) {
        for field in iter {
            self.insert(field);
        }
    }
}
