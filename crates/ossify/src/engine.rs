//! # Transform Engine
//!
//! The facade that ties the pieces together: the [`EntityTable`] of
//! registered overrides, the [`BasePoseCache`], the composition fold, and the
//! optional [`TaskQueue`] for graph mutations that must be deferred.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  TransformEngine                                                │
//! │                                                                 │
//! │  add/remove/query ──► EntityTable (lock per call)               │
//! │                                                                 │
//! │  set_handle_node_transforms(handle, scene, entities, opts)      │
//! │    for each viewpoint (skip if same root as previous):          │
//! │      slot snapshot ◄── EntityTable          (lock, clone, drop) │
//! │      extension skeletons ◄── scene metadata                     │
//! │      per node: base ◄── BasePoseCache, compose, write local     │
//! │      MoveNode + UpdateWorld ──► TaskQueue or run inline         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Graph collaborators are passed in per call rather than stored, so the
//! engine itself is `Send + Sync` and can be shared between the thread that
//! registers overrides and the one that owns the graph.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::asset::AssetSource;
use crate::base_pose::BasePoseCache;
use crate::compose::{self, ScaleMode};
use crate::config::EngineConfig;
use crate::entity::{EntityHandle, EntityResolver, Gender, Viewpoint};
use crate::math::NodeTransform;
use crate::registry::OverrideRegistration;
use crate::scene::{NodeId, SceneGraph};
use crate::table::{EntityTable, SlotKey};
use crate::task::{DeferredTask, TaskQueue, TaskReceiver};
use crate::value::{OverrideKey, OverrideValue};
use crate::visit::Visit;

/// Flags for [`TransformEngine::set_handle_node_transforms`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeOptions {
    /// Run re-parent and world-refresh work now instead of queueing it.
    pub immediate: bool,
    /// Write base poses only, ignoring registered overrides.
    pub reset: bool,
}

pub struct TransformEngine {
    config: EngineConfig,
    scale_mode: RwLock<ScaleMode>,
    table: EntityTable,
    cache: BasePoseCache,
    tasks: Option<TaskQueue>,
}

impl TransformEngine {
    pub fn new(config: EngineConfig, source: Arc<dyn AssetSource>) -> Self {
        let cache = BasePoseCache::new(source, config.asset_root.clone());
        Self {
            scale_mode: RwLock::new(config.scale_mode),
            config,
            table: EntityTable::new(),
            cache,
            tasks: None,
        }
    }

    /// Defer graph mutations through `queue`. Without one, they run inline.
    pub fn with_task_queue(mut self, queue: TaskQueue) -> Self {
        self.tasks = Some(queue);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn table(&self) -> &EntityTable {
        &self.table
    }

    pub fn cache(&self) -> &BasePoseCache {
        &self.cache
    }

    pub fn scale_mode(&self) -> ScaleMode {
        *self.scale_mode.read()
    }

    pub fn set_scale_mode(&self, mode: ScaleMode) {
        *self.scale_mode.write() = mode;
    }

    // ── Registry ─────────────────────────────────────────────────────

    pub fn add_override(&self, key: SlotKey, node: &str, name: &str, value: OverrideValue) {
        self.table.add_override(key, node, name, value);
    }

    pub fn remove_override(&self, key: SlotKey, node: &str, name: &str) -> bool {
        self.table.remove_override(key, node, name)
    }

    pub fn remove_override_component(
        &self,
        key: SlotKey,
        node: &str,
        name: &str,
        value_key: OverrideKey,
        index: i8,
    ) -> bool {
        self.table.remove_override_component(key, node, name, value_key, index)
    }

    /// Drop everything registered for an entity, e.g. when it is deleted.
    pub fn remove_all_for_entity(&self, handle: EntityHandle) -> bool {
        self.table.remove_all_for_entity(handle)
    }

    pub fn remove_named_across_entity(&self, handle: EntityHandle, name: &str) -> usize {
        self.table.remove_named_across_entity(handle, name)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get_override_node_value(
        &self,
        key: SlotKey,
        node: &str,
        name: &str,
        value_key: OverrideKey,
        index: i8,
    ) -> Option<OverrideValue> {
        self.table.get_value(key, node, name, value_key, index)
    }

    /// With `name`, the local transform built from that override's
    /// `value_key` component alone. Without, the node's base transform.
    ///
    /// `None` unless the entity, its root, the live node and a base transform
    /// all resolve.
    pub fn get_override_node_transform(
        &self,
        key: SlotKey,
        node: &str,
        name: Option<&str>,
        value_key: OverrideKey,
        scene: &dyn SceneGraph,
        entities: &dyn EntityResolver,
    ) -> Option<NodeTransform> {
        if !entities.is_alive(key.handle) {
            return None;
        }
        let root = entities.root_node(key.handle, key.viewpoint)?;
        scene.find_node(root, node)?;
        let base = self.resolve_base(key, root, node, scene, entities)?;

        let Some(name) = name else {
            return Some(base);
        };
        let registration = self.table.registration(key, node)?;
        let set = registration.get(name)?;
        let mut transform = NodeTransform::IDENTITY;
        compose::get_override_transform(set, value_key, &mut transform);
        Some(transform)
    }

    pub fn root_model_path(
        &self,
        handle: EntityHandle,
        viewpoint: Viewpoint,
        gender: Gender,
        entities: &dyn EntityResolver,
    ) -> Option<String> {
        entities.root_model_path(handle, viewpoint, gender)
    }

    pub fn visit_nodes(&self, key: SlotKey, visitor: impl FnMut(&str, &OverrideRegistration) -> Visit) -> Visit {
        self.table.visit_nodes(key, visitor)
    }

    pub fn visit_strings(&self, visitor: impl FnMut(&str)) {
        self.table.visit_strings(visitor)
    }

    // ── Base pose ────────────────────────────────────────────────────

    /// Extension skeleton paths listed in metadata anywhere under `root`.
    ///
    /// Each tagged node holds strings in triples; the third of each triple is
    /// a skeleton path. Lists whose length isn't a multiple of 3 are ignored.
    pub fn skeleton_extensions(&self, scene: &dyn SceneGraph, root: NodeId) -> Vec<String> {
        let tag = self.config.extension_tag.as_str();
        let mut extensions = Vec::new();
        scene.visit_depth_first(root, &mut |node| {
            if let Some(strings) = scene.extra_strings(node, tag) {
                if strings.len() % 3 == 0 {
                    extensions.extend(strings.chunks_exact(3).map(|triple| triple[2].clone()));
                }
            }
            Visit::Continue
        });
        extensions
    }

    fn resolve_base(
        &self,
        key: SlotKey,
        root: NodeId,
        node: &str,
        scene: &dyn SceneGraph,
        entities: &dyn EntityResolver,
    ) -> Option<NodeTransform> {
        let skeleton = entities.root_model_path(key.handle, key.viewpoint, key.gender);
        if let Some(base) = skeleton
            .as_deref()
            .and_then(|path| self.cache.get_base_transform(path, node, true))
        {
            return Some(base);
        }
        let extensions = self.skeleton_extensions(scene, root);
        self.cache.get_with_extensions(None, &extensions, node)
    }

    // ── Recompute ────────────────────────────────────────────────────

    /// Recompute and write every overridden node of an entity.
    ///
    /// Returns the number of nodes written. Nodes whose base transform or
    /// live node can't be found are skipped.
    pub fn set_handle_node_transforms(
        &self,
        handle: EntityHandle,
        scene: &mut dyn SceneGraph,
        entities: &dyn EntityResolver,
        options: RecomputeOptions,
    ) -> usize {
        if !entities.is_alive(handle) {
            log::debug!("Skipping recompute for {handle}: entity not loaded");
            return 0;
        }
        let gender = entities.gender(handle).unwrap_or_default();
        let mode = self.scale_mode();
        let mut written = 0;
        let mut last_root = None;

        for viewpoint in Viewpoint::ALL {
            let Some(root) = entities.root_node(handle, viewpoint) else {
                continue;
            };
            if last_root == Some(root) {
                continue;
            }
            last_root = Some(root);

            let key = SlotKey::new(handle, gender, viewpoint);
            let Some(registry) = self.table.slot_snapshot(key) else {
                continue;
            };

            let skeleton = entities.root_model_path(handle, viewpoint, gender);
            let extensions = self.skeleton_extensions(scene, root);
            let mut moves: IndexMap<String, String> = IndexMap::new();

            for (node, registration) in registry.iter() {
                let Some(base) = self
                    .cache
                    .get_with_extensions(skeleton.as_deref(), &extensions, node)
                else {
                    log::debug!("No base transform for '{node}' on {handle}");
                    continue;
                };
                let Some(target) = scene.find_node(root, node) else {
                    continue;
                };

                let composition = (!options.reset).then(|| compose::compose(registration, mode));
                let transform = composition.as_ref().map_or(base, |c| c.apply_to(base));
                if !scene.set_local_transform(target, transform) {
                    log::debug!("Node '{node}' on {handle} is gone, not written");
                    continue;
                }
                written += 1;

                if let Some(destination) = composition.and_then(|c| c.destination) {
                    if scene.find_node(root, &destination).is_some() {
                        moves.insert(node.to_string(), destination);
                    }
                }
            }

            for (node, destination) in moves {
                let task = DeferredTask::MoveNode {
                    handle,
                    viewpoint,
                    node,
                    destination,
                };
                self.deliver(task, options.immediate, scene, entities);
            }
            self.deliver(
                DeferredTask::UpdateWorld { handle, viewpoint },
                options.immediate,
                scene,
                entities,
            );
        }

        written
    }

    /// [`set_handle_node_transforms`](Self::set_handle_node_transforms) with
    /// default options.
    pub fn update_node_all_transforms(
        &self,
        handle: EntityHandle,
        scene: &mut dyn SceneGraph,
        entities: &dyn EntityResolver,
    ) -> usize {
        self.set_handle_node_transforms(handle, scene, entities, RecomputeOptions::default())
    }

    /// Recompute and write a single node. Returns whether it was written.
    pub fn update_node_transforms(
        &self,
        key: SlotKey,
        node: &str,
        scene: &mut dyn SceneGraph,
        entities: &dyn EntityResolver,
    ) -> bool {
        if !entities.is_alive(key.handle) {
            return false;
        }
        let Some(root) = entities.root_node(key.handle, key.viewpoint) else {
            return false;
        };
        let Some(registration) = self.table.registration(key, node) else {
            return false;
        };
        let Some(target) = scene.find_node(root, node) else {
            return false;
        };
        let Some(base) = self.resolve_base(key, root, node, scene, entities) else {
            return false;
        };

        let composition = compose::compose(&registration, self.scale_mode());
        if !scene.set_local_transform(target, composition.apply_to(base)) {
            return false;
        }

        if let Some(destination) = composition.destination {
            if scene.find_node(root, &destination).is_some() {
                let task = DeferredTask::MoveNode {
                    handle: key.handle,
                    viewpoint: key.viewpoint,
                    node: node.to_string(),
                    destination,
                };
                self.deliver(task, false, scene, entities);
            }
        }
        let refresh = DeferredTask::UpdateWorld {
            handle: key.handle,
            viewpoint: key.viewpoint,
        };
        self.deliver(refresh, false, scene, entities);
        true
    }

    /// Restore base poses on every registered entity, then drop all
    /// overrides and cached base poses.
    pub fn revert(&self, scene: &mut dyn SceneGraph, entities: &dyn EntityResolver) {
        let options = RecomputeOptions {
            immediate: false,
            reset: true,
        };
        for handle in self.table.handles() {
            self.set_handle_node_transforms(handle, scene, entities, options);
        }
        self.table.clear();
        self.cache.clear();
        log::info!("Reverted all node transform overrides");
    }

    // ── Deferred work ────────────────────────────────────────────────

    /// Queue a recompute of `handle`. Returns `false` if there is no queue
    /// (or it is closed) and the caller must run it.
    pub fn schedule_recompute(&self, handle: EntityHandle) -> bool {
        self.tasks
            .as_ref()
            .is_some_and(|queue| queue.push(DeferredTask::Recompute { handle }))
    }

    fn deliver(
        &self,
        task: DeferredTask,
        immediate: bool,
        scene: &mut dyn SceneGraph,
        entities: &dyn EntityResolver,
    ) {
        match &self.tasks {
            Some(queue) if !immediate => {
                queue.push(task);
            }
            _ => self.run_task(task, scene, entities),
        }
    }

    /// Execute one deferred task. Must be called on the graph-owning thread.
    /// Targets are re-resolved; anything that no longer exists makes the
    /// task a no-op.
    pub fn run_task(&self, task: DeferredTask, scene: &mut dyn SceneGraph, entities: &dyn EntityResolver) {
        match task {
            DeferredTask::MoveNode {
                handle,
                viewpoint,
                node,
                destination,
            } => {
                let Some(root) = live_root(entities, handle, viewpoint) else {
                    log::debug!("Dropping move of '{node}': {handle} is gone");
                    return;
                };
                let (Some(child), Some(parent)) =
                    (scene.find_node(root, &node), scene.find_node(root, &destination))
                else {
                    log::debug!("Dropping move of '{node}' under '{destination}': node not found");
                    return;
                };
                if !scene.reparent(child, parent) {
                    log::debug!("Could not move '{node}' under '{destination}' on {handle}");
                }
            }
            DeferredTask::UpdateWorld { handle, viewpoint } => match live_root(entities, handle, viewpoint) {
                Some(root) => scene.update_world_transforms(root),
                None => log::debug!("Dropping world refresh: {handle} is gone"),
            },
            DeferredTask::Recompute { handle } => {
                let options = RecomputeOptions {
                    immediate: true,
                    reset: false,
                };
                self.set_handle_node_transforms(handle, scene, entities, options);
            }
        }
    }

    /// Drain `receiver` and run every task, in order. Returns how many ran.
    pub fn run_pending(
        &self,
        receiver: &TaskReceiver,
        scene: &mut dyn SceneGraph,
        entities: &dyn EntityResolver,
    ) -> usize {
        let tasks = receiver.drain();
        let count = tasks.len();
        for task in tasks {
            self.run_task(task, scene, entities);
        }
        count
    }
}

impl std::fmt::Debug for TransformEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformEngine")
            .field("scale_mode", &self.scale_mode())
            .field("entities", &self.table.len())
            .field("cache", &self.cache)
            .field("deferred", &self.tasks.is_some())
            .finish()
    }
}

fn live_root(entities: &dyn EntityResolver, handle: EntityHandle, viewpoint: Viewpoint) -> Option<NodeId> {
    if !entities.is_alive(handle) {
        return None;
    }
    entities.root_node(handle, viewpoint)
}
