//! Entity identity: handles, gender/viewpoint variants, and the resolver
//! collaborator that maps handles onto live entities.

use std::fmt;

use crate::scene::NodeId;

/// Opaque, stable 64-bit identifier for a simulated entity.
///
/// Handles survive within a session but may need re-resolving across a
/// save/load boundary (see [`persist`](crate::persist)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(pub u64);

impl EntityHandle {
    /// Marker bits for static (unversioned) references. Such handles name an
    /// entity that is part of the authored content rather than one created at
    /// runtime, so they resolve to themselves if the entity still exists.
    pub const STATIC_MASK: u64 = 0xFFFF_0000_0000_0000;

    pub const fn is_static(self) -> bool {
        self.0 & Self::STATIC_MASK == Self::STATIC_MASK
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Gender variant of an entity. Selects which skeleton a node's base pose is
/// read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Self; 2] = [Self::Male, Self::Female];

    pub const fn index(self) -> usize {
        match self {
            Self::Male => 0,
            Self::Female => 1,
        }
    }
}

/// Which of the two graph instances of an entity an override applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Viewpoint {
    #[default]
    ThirdPerson,
    FirstPerson,
}

impl Viewpoint {
    pub const ALL: [Self; 2] = [Self::ThirdPerson, Self::FirstPerson];

    pub const fn index(self) -> usize {
        match self {
            Self::ThirdPerson => 0,
            Self::FirstPerson => 1,
        }
    }
}

/// Identity collaborator: resolves handles to live entities.
///
/// Implemented by the host runtime. Every method must be cheap; they are
/// called on the consuming thread during recompute.
pub trait EntityResolver {
    /// Whether the handle names an entity that exists and is not deleted.
    fn is_alive(&self, handle: EntityHandle) -> bool;

    /// Gender classification. `None` for entities without one, which are
    /// treated as [`Gender::Male`].
    fn gender(&self, handle: EntityHandle) -> Option<Gender>;

    /// Root node of the entity's graph for a viewpoint, if loaded.
    fn root_node(&self, handle: EntityHandle, viewpoint: Viewpoint) -> Option<NodeId>;

    /// Path of the skeleton asset that holds the base pose for this
    /// viewpoint/gender, relative to the asset root.
    fn root_model_path(
        &self,
        handle: EntityHandle,
        viewpoint: Viewpoint,
        gender: Gender,
    ) -> Option<String>;

    /// Whether the content file an override name refers to is still loaded.
    /// Content-sourced overrides whose file is gone are pruned after load.
    fn is_content_loaded(&self, _name: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_handles_are_tagged_in_high_bits() {
        assert!(EntityHandle(0xFFFF_0000_0001_2345).is_static());
        assert!(!EntityHandle(0x0000_0000_0000_1001).is_static());
        assert!(!EntityHandle(0xFF00_0000_0000_1001).is_static());
    }

    #[test]
    fn handle_displays_as_hex() {
        assert_eq!(EntityHandle(0x1001).to_string(), "0000000000001001");
    }
}
