//! # Entity Registration Table
//!
//! The root mutable state: every override registered on every entity.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  EntityTable                                                 │
//! │                                                              │
//! │  Mutex<HashMap<EntityHandle, EntitySlots>>                   │
//! │    EntitySlots [gender][viewpoint] → NodeRegistry            │
//! │      NodeRegistry   node  → OverrideRegistration             │
//! │        OverrideRegistration name → OverrideSet               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//!
//! Every method takes the lock for exactly its own duration. No iterator or
//! reference escapes a locked scope: readers either get owned clones
//! ([`slot_snapshot`](EntityTable::slot_snapshot)) or run a visitor inside the
//! lock. Visitors must not call back into the table; the lock is not
//! re-entrant and doing so deadlocks.
//!
//! ## Empty Entries
//!
//! After any removal the touched entity is compacted: empty override sets,
//! nodes with no overrides, and finally entities whose four slots are all
//! empty are dropped. An entity present in the table therefore always has at
//! least one registered value.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::entity::{EntityHandle, Gender, Viewpoint};
use crate::registry::{EntitySlots, NodeRegistry, OverrideRegistration, OverrideSet};
use crate::value::{OverrideKey, OverrideValue};
use crate::visit::Visit;

/// Coordinates of one node registry: an entity's (gender, viewpoint) slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub handle: EntityHandle,
    pub gender: Gender,
    pub viewpoint: Viewpoint,
}

impl SlotKey {
    pub const fn new(handle: EntityHandle, gender: Gender, viewpoint: Viewpoint) -> Self {
        Self {
            handle,
            gender,
            viewpoint,
        }
    }
}

/// Thread-safe store of all registered overrides.
#[derive(Debug, Default)]
pub struct EntityTable {
    entries: Mutex<HashMap<EntityHandle, EntitySlots>>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Internal helpers ─────────────────────────────────────────────

    /// Run `f` on the slot's registry, creating the entity entry on miss.
    fn with_slot_mut<R>(&self, key: SlotKey, f: impl FnOnce(&mut NodeRegistry) -> R) -> R {
        let mut entries = self.entries.lock();
        let slots = entries.entry(key.handle).or_default();
        f(slots.slot_mut(key.gender, key.viewpoint))
    }

    /// Run `f` on an existing entity, then compact it and drop it if empty.
    /// Returns `None` if the entity has no entry.
    fn with_existing_mut<R>(
        &self,
        handle: EntityHandle,
        f: impl FnOnce(&mut EntitySlots) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.lock();
        let slots = entries.get_mut(&handle)?;
        let result = f(slots);
        slots.compact();
        if slots.is_empty() {
            entries.remove(&handle);
        }
        Some(result)
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Register `value` under `name` on `node`, replacing any value with the
    /// same `(key, index)`. Creates the node and name as needed.
    pub fn add_override(&self, key: SlotKey, node: &str, name: &str, value: OverrideValue) {
        self.with_slot_mut(key, |registry| {
            registry.entry(node).entry(name).insert(value);
        });
    }

    /// Remove the whole named override from a node.
    pub fn remove_override(&self, key: SlotKey, node: &str, name: &str) -> bool {
        self.with_existing_mut(key.handle, |slots| {
            slots
                .slot_mut(key.gender, key.viewpoint)
                .get_mut(node)
                .is_some_and(|registration| registration.remove(name))
        })
        .unwrap_or(false)
    }

    /// Remove a single `(key, index)` value from a named override.
    pub fn remove_override_component(
        &self,
        key: SlotKey,
        node: &str,
        name: &str,
        value_key: OverrideKey,
        index: i8,
    ) -> bool {
        self.with_existing_mut(key.handle, |slots| {
            slots
                .slot_mut(key.gender, key.viewpoint)
                .get_mut(node)
                .and_then(|registration| registration.get_mut(name))
                .is_some_and(|set| set.remove(value_key, index))
        })
        .unwrap_or(false)
    }

    /// Drop every override registered for an entity.
    pub fn remove_all_for_entity(&self, handle: EntityHandle) -> bool {
        self.entries.lock().remove(&handle).is_some()
    }

    /// Drop the named override from every node in every slot of an entity.
    /// Returns how many sets were removed.
    pub fn remove_named_across_entity(&self, handle: EntityHandle, name: &str) -> usize {
        self.remove_where(handle, |candidate| candidate == name)
    }

    /// Drop every override on an entity whose name matches `predicate`.
    /// Returns how many sets were removed.
    pub fn remove_where(&self, handle: EntityHandle, mut predicate: impl FnMut(&str) -> bool) -> usize {
        self.with_existing_mut(handle, |slots| {
            let mut removed = 0;
            slots.for_each_slot_mut(|_, _, registry| {
                for (_, registration) in registry.iter_mut() {
                    let before = registration.len();
                    registration.retain(|name, _| !predicate(name));
                    removed += before - registration.len();
                }
            });
            removed
        })
        .unwrap_or(0)
    }

    /// Install a full entity entry, replacing any existing one. Empty entries
    /// are not stored.
    pub fn insert_entity(&self, handle: EntityHandle, mut slots: EntitySlots) {
        slots.compact();
        let mut entries = self.entries.lock();
        if slots.is_empty() {
            entries.remove(&handle);
        } else {
            entries.insert(handle, slots);
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.entries.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// All registered handles, in no particular order.
    pub fn handles(&self) -> Vec<EntityHandle> {
        self.entries.lock().keys().copied().collect()
    }

    /// Look up one stored value.
    pub fn get_value(
        &self,
        key: SlotKey,
        node: &str,
        name: &str,
        value_key: OverrideKey,
        index: i8,
    ) -> Option<OverrideValue> {
        let entries = self.entries.lock();
        entries
            .get(&key.handle)?
            .slot(key.gender, key.viewpoint)
            .get(node)?
            .get(name)?
            .get(value_key, index)
            .cloned()
    }

    /// Owned copy of one node's overrides.
    pub fn registration(&self, key: SlotKey, node: &str) -> Option<OverrideRegistration> {
        let entries = self.entries.lock();
        entries
            .get(&key.handle)?
            .slot(key.gender, key.viewpoint)
            .get(node)
            .cloned()
    }

    /// Owned copy of one slot's registry, for work done outside the lock.
    pub fn slot_snapshot(&self, key: SlotKey) -> Option<NodeRegistry> {
        let entries = self.entries.lock();
        let registry = entries.get(&key.handle)?.slot(key.gender, key.viewpoint);
        (!registry.is_empty()).then(|| registry.clone())
    }

    /// Owned copy of one entity's entry.
    pub fn entity_snapshot(&self, handle: EntityHandle) -> Option<EntitySlots> {
        self.entries.lock().get(&handle).cloned()
    }

    /// Owned copy of the whole table, sorted by handle.
    pub fn snapshot(&self) -> Vec<(EntityHandle, EntitySlots)> {
        let entries = self.entries.lock();
        let mut all: Vec<_> = entries
            .iter()
            .map(|(handle, slots)| (*handle, slots.clone()))
            .collect();
        drop(entries);
        all.sort_by_key(|(handle, _)| *handle);
        all
    }

    // ── Visitors ─────────────────────────────────────────────────────

    /// Visit each node of a slot in registration order, under the lock.
    pub fn visit_nodes(
        &self,
        key: SlotKey,
        mut visitor: impl FnMut(&str, &OverrideRegistration) -> Visit,
    ) -> Visit {
        let entries = self.entries.lock();
        let Some(slots) = entries.get(&key.handle) else {
            return Visit::Continue;
        };
        for (node, registration) in slots.slot(key.gender, key.viewpoint).iter() {
            let visit = visitor(node, registration);
            if visit.is_stop() {
                return visit;
            }
        }
        Visit::Continue
    }

    /// Visit each named override on one node in registration order, under
    /// the lock.
    pub fn visit_overrides_on_node(
        &self,
        key: SlotKey,
        node: &str,
        mut visitor: impl FnMut(&str, &OverrideSet) -> Visit,
    ) -> Visit {
        let entries = self.entries.lock();
        let Some(registration) = entries
            .get(&key.handle)
            .and_then(|slots| slots.slot(key.gender, key.viewpoint).get(node))
        else {
            return Visit::Continue;
        };
        for (name, set) in registration.iter() {
            let visit = visitor(name, set);
            if visit.is_stop() {
                return visit;
            }
        }
        Visit::Continue
    }

    /// Visit every node name, override name, and string payload.
    pub fn visit_strings(&self, mut visitor: impl FnMut(&str)) {
        let entries = self.entries.lock();
        for slots in entries.values() {
            for (_, _, registry) in slots.iter() {
                for (node, registration) in registry.iter() {
                    visitor(node);
                    for (name, set) in registration.iter() {
                        visitor(name);
                        for value in set.iter() {
                            if let Some(s) = value.payload.as_str() {
                                visitor(s);
                            }
                        }
                    }
                }
            }
        }
    }
}
