//! Tail Overrides: layering, persistence, and a deferred re-parent.
//!
//! Two callers push the tail of a character sideways and scale it, a third
//! re-parents it under the spine. The graph thread drains the task queue,
//! then the overrides are saved and restored into a fresh engine.
//!
//! Run with: `cargo run -p ossify --example tail_overrides`

use std::sync::Arc;

use ossify::error::AssetError;
use ossify::prelude::*;

// ── Collaborators ────────────────────────────────────────────────────────

/// Serves one hard-coded skeleton for every path.
struct BuiltinSkeleton;

impl AssetSource for BuiltinSkeleton {
    fn load_skeleton(&self, _path: &str) -> Result<SkeletonAsset, AssetError> {
        Ok(SkeletonAsset {
            roots: vec![AssetNode::named("NPC Root", NodeTransform::IDENTITY).with_child(
                AssetNode::named("Pelvis", NodeTransform::from_xyz(0.0, 0.0, 60.0))
                    .with_child(AssetNode::named("Tail", NodeTransform::from_xyz(0.0, -10.0, 0.0)))
                    .with_child(AssetNode::named("Spine", NodeTransform::from_xyz(0.0, 0.0, 10.0))),
            )],
        })
    }
}

struct OneCharacter {
    handle: EntityHandle,
    root: NodeId,
}

impl EntityResolver for OneCharacter {
    fn is_alive(&self, handle: EntityHandle) -> bool {
        handle == self.handle
    }

    fn gender(&self, _handle: EntityHandle) -> Option<Gender> {
        Some(Gender::Female)
    }

    fn root_node(&self, _handle: EntityHandle, _viewpoint: Viewpoint) -> Option<NodeId> {
        // Both viewpoints share one graph, so only the third-person slot runs.
        Some(self.root)
    }

    fn root_model_path(&self, _handle: EntityHandle, _viewpoint: Viewpoint, _gender: Gender) -> Option<String> {
        Some("actors\\character\\skeleton.nif".to_string())
    }
}

fn main() {
    env_logger::init();

    let mut scene = SceneTree::new();
    let root = BuiltinSkeleton
        .load_skeleton("")
        .ok()
        .and_then(|skeleton| skeleton.instantiate(&mut scene))
        .unwrap_or_else(|| scene.spawn_root("NPC Root", NodeTransform::IDENTITY));
    let character = OneCharacter {
        handle: EntityHandle(0x1001),
        root,
    };

    let (queue, receiver) = task_channel();
    let engine = TransformEngine::new(EngineConfig::default(), Arc::new(BuiltinSkeleton)).with_task_queue(queue);
    engine.set_scale_mode(ScaleMode::Average);

    let key = SlotKey::new(character.handle, Gender::Female, Viewpoint::ThirdPerson);
    engine.add_override(key, "Tail", "wind", OverrideValue::position(0, 5.0));
    engine.add_override(key, "Tail", "grow", OverrideValue::scale(2.0));
    engine.add_override(key, "Tail", "grow-more", OverrideValue::scale(4.0));
    engine.add_override(key, "Tail", "attach", OverrideValue::destination("Spine"));

    let written = engine.update_node_all_transforms(character.handle, &mut scene, &character);
    let ran = engine.run_pending(&receiver, &mut scene, &character);
    log::info!("Wrote {written} nodes, ran {ran} deferred tasks");

    if let Some(tail) = scene.find_node(root, "Tail") {
        log::info!(
            "Tail: local {:?}, parent {:?}, world {:?}",
            scene.local_transform(tail),
            scene.parent(tail).and_then(|p| scene.name(p)),
            scene.world_transform(tail).map(|t| t.translation),
        );
    }

    // Save, then restore into a fresh engine with no task queue.
    let mut writer = RecordWriter::new();
    if let Err(e) = engine.save(&mut writer) {
        log::error!("Save failed: {e}");
        return;
    }
    let bytes = writer.finish();

    let restored = TransformEngine::new(EngineConfig::default(), Arc::new(BuiltinSkeleton));
    match restored.load(&mut RecordReader::new(&bytes), &character, Some(&mut scene)) {
        Ok(report) => log::info!("Restored {:?} ({} bytes)", report.restored, bytes.len()),
        Err(e) => log::error!("Load failed: {e}"),
    }
}
