//! Convenience re-exports: `use ossify::prelude::*` for the common items.

pub use crate::asset::{AssetNode, AssetSource, FsAssetSource, SkeletonAsset};
pub use crate::compose::ScaleMode;
pub use crate::config::EngineConfig;
pub use crate::engine::{RecomputeOptions, TransformEngine};
pub use crate::entity::{EntityHandle, EntityResolver, Gender, Viewpoint};
pub use crate::math::{Mat3, NodeTransform, Quat, Vec3};
pub use crate::persist::{LoadReport, RecordReader, RecordWriter};
pub use crate::scene::{NodeId, SceneGraph, SceneTree};
pub use crate::table::SlotKey;
pub use crate::task::{DeferredTask, TaskQueue, TaskReceiver, task_channel};
pub use crate::value::{OverrideKey, OverridePayload, OverrideValue};
pub use crate::visit::Visit;
