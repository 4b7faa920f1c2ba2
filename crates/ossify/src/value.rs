//! # Override Values
//!
//! An [`OverrideValue`] is one typed parameter contributed by a named
//! override: a translation axis, the uniform scale, one rotation matrix cell,
//! or a re-parent destination.
//!
//! ## Identity
//!
//! Values are identified by `(key, index)` only. The payload is *not* part of
//! equality or ordering, so a set of values holds at most one payload per
//! `(key, index)` and inserting again replaces it:
//!
//! ```text
//! { (Position,0)=1.0, (Scale,0)=2.0 }  +  (Position,0)=5.0
//!   → { (Position,0)=5.0, (Scale,0)=2.0 }
//! ```

use std::cmp::Ordering;

/// Which transform component a value addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverrideKey {
    /// Uniform scale, index 0.
    Scale,
    /// Translation, indices 0..3 for x, y, z.
    Position,
    /// Rotation matrix cell, indices 0..9 row-major.
    Rotation,
    /// Name of a node the overridden node should be re-parented under.
    Destination,
}

impl OverrideKey {
    /// Stable code used in the persisted record stream.
    pub const fn code(self) -> u16 {
        match self {
            Self::Scale => 20,
            Self::Position => 21,
            Self::Rotation => 22,
            Self::Destination => 23,
        }
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            20 => Some(Self::Scale),
            21 => Some(Self::Position),
            22 => Some(Self::Rotation),
            23 => Some(Self::Destination),
            _ => None,
        }
    }
}

/// Payload carried by an [`OverrideValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum OverridePayload {
    Float(f32),
    Int(i32),
    Bool(bool),
    String(String),
    /// Reference to another entity by persistent handle. Remapped on load.
    Resource(u64),
}

impl OverridePayload {
    /// Numeric view of the payload. Integers are widened.
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Self::Float(f) => Some(f),
            Self::Int(i) => Some(i as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A single typed override parameter, keyed by `(key, index)`.
#[derive(Debug, Clone)]
pub struct OverrideValue {
    pub key: OverrideKey,
    pub index: i8,
    pub payload: OverridePayload,
}

impl OverrideValue {
    pub fn new(key: OverrideKey, index: i8, payload: OverridePayload) -> Self {
        Self {
            key,
            index,
            payload,
        }
    }

    pub fn position(axis: i8, value: f32) -> Self {
        Self::new(OverrideKey::Position, axis, OverridePayload::Float(value))
    }

    pub fn scale(value: f32) -> Self {
        Self::new(OverrideKey::Scale, 0, OverridePayload::Float(value))
    }

    pub fn rotation(cell: i8, value: f32) -> Self {
        Self::new(OverrideKey::Rotation, cell, OverridePayload::Float(value))
    }

    pub fn destination(node: impl Into<String>) -> Self {
        Self::new(
            OverrideKey::Destination,
            0,
            OverridePayload::String(node.into()),
        )
    }

    /// A payload-less probe for set lookups by `(key, index)`.
    pub(crate) fn probe(key: OverrideKey, index: i8) -> Self {
        Self::new(key, index, OverridePayload::Int(0))
    }
}

impl PartialEq for OverrideValue {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.index == other.index
    }
}

impl Eq for OverrideValue {}

impl PartialOrd for OverrideValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OverrideValue {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.key, self.index).cmp(&(other.key, other.index))
    }
}
