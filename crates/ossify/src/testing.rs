//! Shared test fakes: an in-memory asset source, a table-driven entity
//! resolver, and a character fixture wiring both to a live [`SceneTree`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::asset::{AssetNode, AssetSource, SkeletonAsset};
use crate::config::EngineConfig;
use crate::engine::TransformEngine;
use crate::entity::{EntityHandle, EntityResolver, Gender, Viewpoint};
use crate::error::AssetError;
use crate::math::NodeTransform;
use crate::scene::{NodeId, SceneTree};
use crate::task::{TaskReceiver, task_channel};

pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Assets ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryAssetSource {
    assets: Mutex<HashMap<String, SkeletonAsset>>,
    loads: AtomicUsize,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, asset: SkeletonAsset) {
        self.assets.lock().insert(path.to_string(), asset);
    }

    /// Number of load attempts, hits and misses alike.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl AssetSource for MemoryAssetSource {
    fn load_skeleton(&self, path: &str) -> Result<SkeletonAsset, AssetError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.assets
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }
}

// ── Entities ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeEntities {
    pub alive: HashSet<EntityHandle>,
    pub genders: HashMap<EntityHandle, Gender>,
    pub roots: HashMap<(EntityHandle, Viewpoint), NodeId>,
    pub skeletons: HashMap<(Viewpoint, Gender), String>,
    pub loaded_content: HashSet<String>,
}

impl EntityResolver for FakeEntities {
    fn is_alive(&self, handle: EntityHandle) -> bool {
        self.alive.contains(&handle)
    }

    fn gender(&self, handle: EntityHandle) -> Option<Gender> {
        self.genders.get(&handle).copied()
    }

    fn root_node(&self, handle: EntityHandle, viewpoint: Viewpoint) -> Option<NodeId> {
        self.roots.get(&(handle, viewpoint)).copied()
    }

    fn root_model_path(&self, _handle: EntityHandle, viewpoint: Viewpoint, gender: Gender) -> Option<String> {
        self.skeletons.get(&(viewpoint, gender)).cloned()
    }

    fn is_content_loaded(&self, name: &str) -> bool {
        self.loaded_content.contains(name)
    }
}

// ── Character fixture ────────────────────────────────────────────────────

pub const HANDLE: EntityHandle = EntityHandle(0x1001);
pub const SKELETON: &str = "actors\\character\\skeleton.nif";
pub const SKELETON_RESOLVED: &str = "meshes/actors/character/skeleton.nif";

pub fn pelvis_base() -> NodeTransform {
    NodeTransform::from_xyz(0.0, 0.0, 60.0)
}

pub fn tail_base() -> NodeTransform {
    NodeTransform::from_xyz(0.0, -10.0, 2.0)
}

pub fn spine_base() -> NodeTransform {
    NodeTransform::from_xyz(0.0, 0.0, 10.0)
}

/// ```text
/// NPC Root
/// └─ Pelvis
///    ├─ Tail
///    │  └─ TailTip
///    └─ Spine
/// ```
pub fn character_skeleton() -> SkeletonAsset {
    SkeletonAsset {
        roots: vec![AssetNode::named("NPC Root", NodeTransform::IDENTITY).with_child(
            AssetNode::named("Pelvis", pelvis_base())
                .with_child(
                    AssetNode::named("Tail", tail_base())
                        .with_child(AssetNode::named("TailTip", NodeTransform::from_xyz(0.0, -5.0, 0.0))),
                )
                .with_child(AssetNode::named("Spine", spine_base())),
        )],
    }
}

/// One female character (handle `0x1001`) with separate third- and
/// first-person graphs built from the same skeleton.
pub struct Fixture {
    pub source: Arc<MemoryAssetSource>,
    pub engine: TransformEngine,
    pub scene: SceneTree,
    pub entities: FakeEntities,
    pub third_root: NodeId,
    pub first_root: NodeId,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_test_logger();
        let source = Arc::new(MemoryAssetSource::new());
        source.insert(SKELETON_RESOLVED, character_skeleton());

        let mut scene = SceneTree::new();
        let skeleton = character_skeleton();
        let third_root = skeleton.instantiate(&mut scene).unwrap_or(NodeId(0));
        let first_root = skeleton.instantiate(&mut scene).unwrap_or(NodeId(0));

        let mut entities = FakeEntities::default();
        entities.alive.insert(HANDLE);
        entities.genders.insert(HANDLE, Gender::Female);
        entities.roots.insert((HANDLE, Viewpoint::ThirdPerson), third_root);
        entities.roots.insert((HANDLE, Viewpoint::FirstPerson), first_root);
        for viewpoint in Viewpoint::ALL {
            for gender in Gender::ALL {
                entities.skeletons.insert((viewpoint, gender), SKELETON.to_string());
            }
        }

        let engine = TransformEngine::new(config, Arc::clone(&source) as Arc<dyn AssetSource>);
        Self {
            source,
            engine,
            scene,
            entities,
            third_root,
            first_root,
        }
    }

    /// Route deferred work through a queue instead of running it inline.
    pub fn with_queue(mut self) -> (Self, TaskReceiver) {
        let (queue, receiver) = task_channel();
        self.engine = self.engine.with_task_queue(queue);
        (self, receiver)
    }

    pub fn node(&self, viewpoint: Viewpoint, name: &str) -> NodeId {
        use crate::scene::SceneGraph;
        let root = match viewpoint {
            Viewpoint::ThirdPerson => self.third_root,
            Viewpoint::FirstPerson => self.first_root,
        };
        self.scene.find_node(root, name).unwrap_or(root)
    }

    pub fn local(&self, viewpoint: Viewpoint, name: &str) -> NodeTransform {
        use crate::scene::SceneGraph;
        self.scene
            .local_transform(self.node(viewpoint, name))
            .unwrap_or(NodeTransform::IDENTITY)
    }
}
