//! Math types and glam re-exports.
//!
//! We re-export [glam](https://docs.rs/glam) types so users don't need to
//! depend on it directly. The [`NodeTransform`] type is the local transform a
//! skeleton node carries relative to its parent: position, a 3×3 rotation
//! matrix, and a uniform scale.
//!
//! ## Composition
//!
//! Transforms compose like the parent/child chain in a scene graph:
//!
//! ```text
//! (a * b).rotation    = a.rotation * b.rotation
//! (a * b).translation = a.translation + a.scale * (a.rotation * b.translation)
//! (a * b).scale       = a.scale * b.scale
//! ```
//!
//! Composition is associative but not commutative, which is why override
//! registration order matters.

use std::ops::Mul;

pub use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Number of cells in a row-major 3×3 rotation matrix.
pub const ROTATION_CELLS: usize = 9;

/// A node-local transform: translation, 3×3 rotation, and uniform scale.
///
/// The rotation is kept as a full matrix (not a quaternion) because overrides
/// address it cell by cell. Serialized rotations are column-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTransform {
    pub translation: Vec3,
    pub rotation: Mat3,
    pub scale: f32,
}

impl NodeTransform {
    /// Identity transform (origin, no rotation, scale of 1).
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Mat3::IDENTITY,
        scale: 1.0,
    };

    /// Create a transform at the given position.
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        Self {
            translation: Vec3::new(x, y, z),
            ..Self::IDENTITY
        }
    }

    /// Create a pure rotation.
    pub fn from_rotation(rotation: Mat3) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Build from the decomposed form glTF stores (translation, xyzw
    /// quaternion, per-axis scale).
    ///
    /// Node transforms only carry a uniform scale, so a non-uniform scale
    /// collapses to its x component.
    pub fn from_decomposed(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        Self {
            translation: Vec3::from_array(translation),
            rotation: Mat3::from_quat(Quat::from_array(rotation)),
            scale: scale[0],
        }
    }

    /// Return a copy with uniform scale applied.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Read one cell of the rotation matrix by row-major index (0..9).
    pub fn rotation_cell(&self, index: usize) -> Option<f32> {
        if index >= ROTATION_CELLS {
            return None;
        }
        let (row, col) = (index / 3, index % 3);
        Some(self.rotation.col(col)[row])
    }

    /// Write one cell of the rotation matrix by row-major index (0..9).
    /// Out-of-range indices are ignored.
    pub fn set_rotation_cell(&mut self, index: usize, value: f32) {
        if index >= ROTATION_CELLS {
            return;
        }
        let (row, col) = (index / 3, index % 3);
        self.rotation.col_mut(col)[row] = value;
    }

    /// Compute the 4x4 model matrix.
    pub fn matrix(&self) -> Mat4 {
        let m = self.rotation * self.scale;
        Mat4::from_cols(
            m.x_axis.extend(0.0),
            m.y_axis.extend(0.0),
            m.z_axis.extend(0.0),
            self.translation.extend(1.0),
        )
    }

    /// Approximate equality, for comparing composed results.
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        self.translation.abs_diff_eq(other.translation, max_abs_diff)
            && self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            && (self.scale - other.scale).abs() <= max_abs_diff
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for NodeTransform {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            translation: self.translation + (self.rotation * rhs.translation) * self.scale,
            rotation: self.rotation * rhs.rotation,
            scale: self.scale * rhs.scale,
        }
    }
}
