//! # Skeleton Assets
//!
//! A skeleton asset is the authored, unmodified node hierarchy an entity's
//! graph was built from. The base-pose cache reads node-local transforms out
//! of it; nothing else in the engine touches asset files.
//!
//! ## Formats
//!
//! [`FsAssetSource`] picks a parser by file extension:
//!
//! - **`.gltf` / `.glb`**: parsed with the [`gltf`](https://docs.rs/gltf) crate
//!   (behind the default `gltf` feature). Only the node hierarchy is read;
//!   buffers, meshes and skins are ignored.
//! - **`.json`**: a plain serde dump of [`SkeletonAsset`], handy for tooling
//!   and tests.
//!
//! ```text
//! load_skeleton("actors/character/character assets/skeleton.gltf")
//!   │
//!   ├─ read bytes from <data_dir>/<path>
//!   ├─ parse hierarchy (roots = nodes that are nobody's child)
//!   └─ SkeletonAsset { roots: [AssetNode { name, transform, children }] }
//! ```
//!
//! Paths use `/` or `\` interchangeably.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AssetError;
use crate::math::NodeTransform;
use crate::scene::{NodeId, SceneTree};

/// Nesting deeper than this is treated as a malformed (probably cyclic) file.
const MAX_DEPTH: usize = 512;

/// One node of a skeleton asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub transform: NodeTransform,
    #[serde(default)]
    pub children: Vec<AssetNode>,
}

impl AssetNode {
    pub fn named(name: &str, transform: NodeTransform) -> Self {
        Self {
            name: Some(name.to_string()),
            transform,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: AssetNode) -> Self {
        self.children.push(child);
        self
    }
}

/// A parsed skeleton: its root nodes in file order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkeletonAsset {
    pub roots: Vec<AssetNode>,
}

impl SkeletonAsset {
    /// Depth-first, pre-order walk over every node.
    pub fn walk(&self, mut f: impl FnMut(&AssetNode)) {
        let mut stack: Vec<&AssetNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            f(node);
            stack.extend(node.children.iter().rev());
        }
    }

    /// Build a live copy of the hierarchy in `tree`. Returns the first root.
    pub fn instantiate(&self, tree: &mut SceneTree) -> Option<NodeId> {
        let mut first = None;
        for root in &self.roots {
            let id = tree.spawn_root(root.name.as_deref().unwrap_or(""), root.transform);
            if first.is_none() {
                first = Some(id);
            }
            let mut stack: Vec<(NodeId, &AssetNode)> =
                root.children.iter().rev().map(|c| (id, c)).collect();
            while let Some((parent, node)) = stack.pop() {
                let Some(child) =
                    tree.spawn_child(parent, node.name.as_deref().unwrap_or(""), node.transform)
                else {
                    continue;
                };
                stack.extend(node.children.iter().rev().map(|c| (child, c)));
            }
        }
        first
    }
}

/// Asset collaborator: loads skeleton assets by path.
///
/// Implementations may be called concurrently from several threads.
pub trait AssetSource: Send + Sync {
    fn load_skeleton(&self, path: &str) -> Result<SkeletonAsset, AssetError>;
}

/// Normalize a game-style asset path to forward slashes.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

// ── Filesystem source ────────────────────────────────────────────────────

/// Loads skeleton assets from a data directory on disk.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    data_dir: PathBuf,
}

impl FsAssetSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl AssetSource for FsAssetSource {
    fn load_skeleton(&self, path: &str) -> Result<SkeletonAsset, AssetError> {
        let full = self.data_dir.join(normalize_path(path));
        let bytes = std::fs::read(&full).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                AssetError::NotFound(path.to_string())
            } else {
                AssetError::Io {
                    path: path.to_string(),
                    source,
                }
            }
        })?;

        let extension = full
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => parse_json(&bytes, path),
            Some("gltf" | "glb") => parse_gltf(&bytes, path),
            _ => Err(AssetError::Parse {
                path: path.to_string(),
                reason: "unrecognized skeleton format".to_string(),
            }),
        }
    }
}

/// Parse a serde JSON skeleton dump.
pub fn parse_json(bytes: &[u8], path: &str) -> Result<SkeletonAsset, AssetError> {
    serde_json::from_slice(bytes).map_err(|e| AssetError::Parse {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// Parse the node hierarchy of a glTF or GLB file.
#[cfg(feature = "gltf")]
pub fn parse_gltf(bytes: &[u8], path: &str) -> Result<SkeletonAsset, AssetError> {
    let parse_error = |reason: String| AssetError::Parse {
        path: path.to_string(),
        reason,
    };
    let gltf = gltf::Gltf::from_slice(bytes).map_err(|e| parse_error(e.to_string()))?;

    let mut is_child = vec![false; gltf.nodes().len()];
    for node in gltf.nodes() {
        for child in node.children() {
            is_child[child.index()] = true;
        }
    }

    let mut roots = Vec::new();
    for node in gltf.nodes().filter(|n| !is_child[n.index()]) {
        roots.push(convert_gltf_node(node, 0).ok_or_else(|| {
            parse_error(format!("node hierarchy deeper than {MAX_DEPTH}"))
        })?);
    }
    Ok(SkeletonAsset { roots })
}

#[cfg(feature = "gltf")]
fn convert_gltf_node(node: gltf::Node<'_>, depth: usize) -> Option<AssetNode> {
    if depth > MAX_DEPTH {
        return None;
    }
    let (translation, rotation, scale) = node.transform().decomposed();
    let mut children = Vec::new();
    for child in node.children() {
        children.push(convert_gltf_node(child, depth + 1)?);
    }
    Some(AssetNode {
        name: node.name().map(str::to_string),
        transform: NodeTransform::from_decomposed(translation, rotation, scale),
        children,
    })
}

#[cfg(not(feature = "gltf"))]
pub fn parse_gltf(_bytes: &[u8], path: &str) -> Result<SkeletonAsset, AssetError> {
    Err(AssetError::Parse {
        path: path.to_string(),
        reason: "built without glTF support".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;

    const MINIMAL_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [ { "nodes": [0] } ],
        "nodes": [
            { "name": "NPC Root", "children": [1] },
            { "name": "Tail", "translation": [0.0, 1.0, 2.0], "scale": [3.0, 3.0, 3.0], "children": [2] },
            { "name": "TailTip" }
        ]
    }"#;

    fn names(asset: &SkeletonAsset) -> Vec<String> {
        let mut out = Vec::new();
        asset.walk(|node| out.push(node.name.clone().unwrap_or_default()));
        out
    }

    #[cfg(feature = "gltf")]
    #[test]
    fn gltf_hierarchy_is_read() {
        let asset = parse_gltf(MINIMAL_GLTF.as_bytes(), "skeleton.gltf").unwrap();
        assert_eq!(names(&asset), ["NPC Root", "Tail", "TailTip"]);

        let tail = &asset.roots[0].children[0];
        assert_eq!(tail.transform.translation, crate::math::Vec3::new(0.0, 1.0, 2.0));
        assert_eq!(tail.transform.scale, 3.0);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_json(b"not json", "broken.json").unwrap_err();
        assert!(matches!(err, AssetError::Parse { .. }));
    }

    #[test]
    fn fs_source_reads_json_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let asset = SkeletonAsset {
            roots: vec![AssetNode::named("Root", NodeTransform::IDENTITY)
                .with_child(AssetNode::named("Tail", NodeTransform::from_xyz(1.0, 0.0, 0.0)))],
        };
        std::fs::create_dir_all(dir.path().join("meshes/actors")).unwrap();
        std::fs::write(
            dir.path().join("meshes/actors/skeleton.json"),
            serde_json::to_vec(&asset).unwrap(),
        )
        .unwrap();

        let source = FsAssetSource::new(dir.path());
        let loaded = source.load_skeleton("meshes\\actors\\skeleton.json").unwrap();
        assert_eq!(loaded, asset);

        let missing = source.load_skeleton("meshes/actors/nope.json").unwrap_err();
        assert!(matches!(missing, AssetError::NotFound(_)));
    }

    #[test]
    fn instantiate_builds_matching_tree() {
        let asset = SkeletonAsset {
            roots: vec![AssetNode::named("Root", NodeTransform::IDENTITY)
                .with_child(AssetNode::named("A", NodeTransform::from_xyz(1.0, 0.0, 0.0))
                    .with_child(AssetNode::named("B", NodeTransform::IDENTITY)))
                .with_child(AssetNode::named("C", NodeTransform::IDENTITY))],
        };
        let mut tree = SceneTree::new();
        let root = asset.instantiate(&mut tree).unwrap();

        let a = tree.find_node(root, "A").unwrap();
        let b = tree.find_node(root, "B").unwrap();
        assert_eq!(tree.parent(b), Some(a));
        assert_eq!(tree.local_transform(a), Some(NodeTransform::from_xyz(1.0, 0.0, 0.0)));
        assert!(tree.find_node(root, "C").is_some());
    }
}
