//! # Ossify: Layered Node Transform Overrides
//!
//! Lets many independent callers attach named position / rotation / scale
//! adjustments to named nodes of an entity's skeleton, and composes them on
//! top of the skeleton's authored base pose.
//!
//! ```text
//! callers ──add/remove──► EntityTable          handle → [gender][viewpoint]
//!                           │                           → node → name → values
//!                           ▼
//!   skeleton asset ──► BasePoseCache ──► compose ──► SceneGraph (local transforms)
//!                                           │
//!                                           └─ re-parent / world refresh
//!                                              ──► TaskQueue (graph thread)
//!
//! save/load ◄──► persist (ACTM records, handle re-resolution, pruning)
//! ```
//!
//! Start with `use ossify::prelude::*` and build a
//! [`TransformEngine`](engine::TransformEngine).

pub mod asset;
pub mod base_pose;
pub mod compose;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod math;
pub mod persist;
pub mod prelude;
pub mod registry;
pub mod scene;
pub mod table;
pub mod task;
pub mod value;
pub mod visit;

#[cfg(test)]
pub(crate) mod testing;

/// Install the `env_logger` backend with an `info` default, overridable via
/// `RUST_LOG`. Safe to call more than once.
pub fn init_logger() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}
