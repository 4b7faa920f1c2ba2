//! # Override Registry Containers
//!
//! The nested containers that hold registered overrides for one entity:
//!
//! ```text
//! EntitySlots            [gender][viewpoint] → NodeRegistry
//!   NodeRegistry         node name           → OverrideRegistration
//!     OverrideRegistration  override name    → OverrideSet
//!       OverrideSet         {(key, index) → payload}
//! ```
//!
//! Both name-keyed levels preserve insertion order. The order of override
//! names under a node is the composition order, so removal always shifts
//! (never swaps) to keep the remaining entries in place.
//!
//! These types carry no locking; the [`EntityTable`](crate::table::EntityTable)
//! owns them behind its lock.

use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::entity::{Gender, Viewpoint};
use crate::value::{OverrideKey, OverrideValue};

/// Interned node or override name.
pub type Name = Arc<str>;

// ── OverrideSet ──────────────────────────────────────────────────────────

/// The values contributed by one named override on one node, unique by
/// `(key, index)`.
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    values: BTreeSet<OverrideValue>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value with the same
    /// `(key, index)`.
    pub fn insert(&mut self, value: OverrideValue) {
        self.values.replace(value);
    }

    /// Remove the value at `(key, index)`. Returns whether one was present.
    pub fn remove(&mut self, key: OverrideKey, index: i8) -> bool {
        self.values.remove(&OverrideValue::probe(key, index))
    }

    pub fn get(&self, key: OverrideKey, index: i8) -> Option<&OverrideValue> {
        self.values.get(&OverrideValue::probe(key, index))
    }

    pub fn contains(&self, key: OverrideKey, index: i8) -> bool {
        self.get(key, index).is_some()
    }

    /// Values in `(key, index)` order.
    pub fn iter(&self) -> impl Iterator<Item = &OverrideValue> {
        self.values.iter()
    }

    pub fn retain(&mut self, f: impl FnMut(&OverrideValue) -> bool) {
        self.values.retain(f);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Sets compare payloads too, unlike the values' own identity.
impl PartialEq for OverrideSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a == b && a.payload == b.payload)
    }
}

impl FromIterator<OverrideValue> for OverrideSet {
    fn from_iter<I: IntoIterator<Item = OverrideValue>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

// ── OverrideRegistration ─────────────────────────────────────────────────

/// All named overrides registered on one node, in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideRegistration {
    sets: IndexMap<Name, OverrideSet>,
}

impl OverrideRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find-or-insert the set for `name`. New names go to the end.
    pub fn entry(&mut self, name: &str) -> &mut OverrideSet {
        match self.sets.get_index_of(name) {
            Some(index) => &mut self.sets[index],
            None => self.sets.entry(Name::from(name)).or_default(),
        }
    }

    pub fn insert(&mut self, name: Name, set: OverrideSet) {
        self.sets.insert(name, set);
    }

    pub fn get(&self, name: &str) -> Option<&OverrideSet> {
        self.sets.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut OverrideSet> {
        self.sets.get_mut(name)
    }

    /// Remove a named set, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> bool {
        self.sets.shift_remove(name).is_some()
    }

    /// Named sets in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &OverrideSet)> {
        self.sets.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.sets.keys()
    }

    pub fn retain(&mut self, mut f: impl FnMut(&str, &mut OverrideSet) -> bool) {
        self.sets.retain(|name, set| f(name, set));
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Drop empty sets.
    pub(crate) fn compact(&mut self) {
        self.sets.retain(|_, set| !set.is_empty());
    }
}

// ── NodeRegistry ─────────────────────────────────────────────────────────

/// Node name → overrides on that node, for one (gender, viewpoint) slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeRegistry {
    nodes: IndexMap<Name, OverrideRegistration>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&mut self, node: &str) -> &mut OverrideRegistration {
        match self.nodes.get_index_of(node) {
            Some(index) => &mut self.nodes[index],
            None => self.nodes.entry(Name::from(node)).or_default(),
        }
    }

    pub fn insert(&mut self, node: Name, registration: OverrideRegistration) {
        self.nodes.insert(node, registration);
    }

    pub fn get(&self, node: &str) -> Option<&OverrideRegistration> {
        self.nodes.get(node)
    }

    pub fn get_mut(&mut self, node: &str) -> Option<&mut OverrideRegistration> {
        self.nodes.get_mut(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &OverrideRegistration)> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Name, &mut OverrideRegistration)> {
        self.nodes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop empty sets, then nodes left with no overrides.
    pub(crate) fn compact(&mut self) {
        for registration in self.nodes.values_mut() {
            registration.compact();
        }
        self.nodes.retain(|_, registration| !registration.is_empty());
    }
}

// ── EntitySlots ──────────────────────────────────────────────────────────

/// The 2×2 (gender × viewpoint) node registries of one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySlots {
    slots: [[NodeRegistry; 2]; 2],
}

impl EntitySlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, gender: Gender, viewpoint: Viewpoint) -> &NodeRegistry {
        &self.slots[gender.index()][viewpoint.index()]
    }

    pub fn slot_mut(&mut self, gender: Gender, viewpoint: Viewpoint) -> &mut NodeRegistry {
        &mut self.slots[gender.index()][viewpoint.index()]
    }

    /// All four slots with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (Gender, Viewpoint, &NodeRegistry)> {
        Gender::ALL.into_iter().flat_map(move |gender| {
            Viewpoint::ALL
                .into_iter()
                .map(move |viewpoint| (gender, viewpoint, self.slot(gender, viewpoint)))
        })
    }

    pub fn for_each_slot_mut(&mut self, mut f: impl FnMut(Gender, Viewpoint, &mut NodeRegistry)) {
        for gender in Gender::ALL {
            for viewpoint in Viewpoint::ALL {
                f(gender, viewpoint, self.slot_mut(gender, viewpoint));
            }
        }
    }

    /// An entity whose four slots are all empty is logically absent.
    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, _, registry)| registry.is_empty())
    }

    pub(crate) fn compact(&mut self) {
        self.for_each_slot_mut(|_, _, registry| registry.compact());
    }
}
