//! # Composition
//!
//! Turns the named overrides registered on one node into a single local
//! transform, then places it on top of the node's base pose.
//!
//! ```text
//! registration (in order):  a, b, c
//!
//! local(x)  = identity with x's Position / Scale / Rotation values written in
//! composed  = identity * local(a) * local(b) * local(c)
//! final     = base * composed
//! ```
//!
//! Order matters: rotation does not commute, and each override's translation
//! is carried through the rotation and scale of the ones before it.
//!
//! ## Scale Policy
//!
//! The fold multiplies scales. [`ScaleMode`] can then replace the composed
//! scale with an aggregate over the overrides that actually set one:
//!
//! | Mode       | Composed scale                          |
//! |------------|-----------------------------------------|
//! | `multiply` | product (fold result, unchanged)        |
//! | `average`  | sum / (contributors + 1)                |
//! | `sum`      | sum                                     |
//! | `max`      | largest                                 |
//!
//! With no contributors every mode leaves the scale at 1.

use serde::{Deserialize, Serialize};

use crate::math::NodeTransform;
use crate::registry::{OverrideRegistration, OverrideSet};
use crate::value::OverrideKey;

/// How composed scales are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleMode {
    #[default]
    Multiply,
    Average,
    Sum,
    Max,
}

/// Composed local transform of a node plus an optional re-parent target.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub transform: NodeTransform,
    /// Destination of the last override that names one.
    pub destination: Option<String>,
}

impl Composition {
    /// The node's final local transform.
    pub fn apply_to(&self, base: NodeTransform) -> NodeTransform {
        base * self.transform
    }
}

/// Write one component of `set` into `transform`.
///
/// Components without stored values keep whatever `transform` had. Positions
/// use indices 0..3, rotation cells 0..9 (row-major), scale index 0.
/// Non-numeric payloads are ignored.
pub fn get_override_transform(set: &OverrideSet, key: OverrideKey, transform: &mut NodeTransform) {
    match key {
        OverrideKey::Position => {
            for axis in 0..3 {
                if let Some(v) = set.get(key, axis as i8).and_then(|v| v.payload.as_f32()) {
                    transform.translation[axis] = v;
                }
            }
        }
        OverrideKey::Rotation => {
            for cell in 0..crate::math::ROTATION_CELLS {
                if let Some(v) = set.get(key, cell as i8).and_then(|v| v.payload.as_f32()) {
                    transform.set_rotation_cell(cell, v);
                }
            }
        }
        OverrideKey::Scale => {
            if let Some(v) = set.get(key, 0).and_then(|v| v.payload.as_f32()) {
                transform.scale = v;
            }
        }
        OverrideKey::Destination => {}
    }
}

/// The local transform one override set describes.
pub fn local_transform(set: &OverrideSet) -> NodeTransform {
    let mut transform = NodeTransform::IDENTITY;
    get_override_transform(set, OverrideKey::Position, &mut transform);
    get_override_transform(set, OverrideKey::Rotation, &mut transform);
    get_override_transform(set, OverrideKey::Scale, &mut transform);
    transform
}

/// Re-parent target named by `set`, if any. Empty names don't count.
pub fn destination(set: &OverrideSet) -> Option<&str> {
    set.get(OverrideKey::Destination, 0)
        .and_then(|v| v.payload.as_str())
        .filter(|s| !s.is_empty())
}

/// Fold a node's overrides, in registration order, into one local transform.
pub fn compose(registration: &OverrideRegistration, mode: ScaleMode) -> Composition {
    let mut transform = NodeTransform::IDENTITY;
    let mut destination_name = None;
    let mut contributors = 0u32;
    let mut sum = 0.0f32;
    let mut max: Option<f32> = None;

    for (_, set) in registration.iter() {
        let local = local_transform(set);
        transform = transform * local;

        if set.get(OverrideKey::Scale, 0).is_some_and(|v| v.payload.as_f32().is_some()) {
            contributors += 1;
            sum += local.scale;
            max = Some(max.map_or(local.scale, |m| m.max(local.scale)));
        }
        if let Some(name) = destination(set) {
            destination_name = Some(name.to_string());
        }
    }

    if contributors > 0 {
        match mode {
            ScaleMode::Multiply => {}
            ScaleMode::Average => transform.scale = sum / (contributors + 1) as f32,
            ScaleMode::Sum => transform.scale = sum,
            ScaleMode::Max => transform.scale = max.unwrap_or(1.0),
        }
    }

    Composition {
        transform,
        destination: destination_name,
    }
}
