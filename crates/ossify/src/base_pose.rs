//! # Base-Pose Cache
//!
//! Maps skeleton asset path → (node name → authored local transform). The
//! authored transform is the "base" every override composes on top of, so it
//! must come from the asset file and never from the live graph (which already
//! carries last frame's overrides).
//!
//! ```text
//! get_base_transform("actors/character/skeleton.gltf", "Tail", relative)
//!   │
//!   ├─ lock ─ cached? ──yes──► lookup node ─► unlock ─► Some / None
//!   │            │
//!   │            no ─► unlock
//!   │
//!   ├─ load + parse asset (no lock held)
//!   │     └─ failure ─► warn, return None (not cached; retried next time)
//!   │
//!   └─ lock ─ insert (first writer wins) ─► lookup node ─► unlock
//! ```
//!
//! ## Rules
//!
//! - Relative paths get the configured asset root prepended before loading;
//!   the cache is keyed by the path as given.
//! - Unnamed nodes are skipped. If several nodes share a name, the one
//!   visited last in a depth-first walk wins.
//! - A successful parse is cached even if the requested node is absent.
//!   Failed loads are not cached.
//! - Entries are immutable and never evicted except by [`clear`](BasePoseCache::clear).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::asset::{AssetSource, SkeletonAsset, normalize_path};
use crate::math::NodeTransform;

/// Node name → authored local transform for one skeleton asset.
pub type NodeTransformMap = HashMap<String, NodeTransform>;

// ── Stats ────────────────────────────────────────────────────────────────

/// Live cache counters. Relaxed atomics; the numbers are diagnostic only.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
    pub entries: usize,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}

// ── Cache ────────────────────────────────────────────────────────────────

/// Thread-safe, lazily filled base-pose cache.
pub struct BasePoseCache {
    source: Arc<dyn AssetSource>,
    asset_root: String,
    entries: Mutex<HashMap<String, Arc<NodeTransformMap>>>,
    stats: CacheStats,
}

impl BasePoseCache {
    /// `asset_root` is the directory relative paths are resolved under
    /// (usually `"meshes"`).
    pub fn new(source: Arc<dyn AssetSource>, asset_root: impl Into<String>) -> Self {
        Self {
            source,
            asset_root: asset_root.into(),
            entries: Mutex::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// Path actually handed to the asset source.
    fn resolve(&self, path: &str, relative: bool) -> String {
        let path = normalize_path(path);
        if relative && !self.asset_root.is_empty() {
            format!("{}/{}", self.asset_root.trim_end_matches(['/', '\\']), path)
        } else {
            path
        }
    }

    /// Cached map for `path`, loading it on miss.
    fn node_map(&self, path: &str, relative: bool) -> Option<Arc<NodeTransformMap>> {
        if let Some(map) = self.entries.lock().get(path) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(Arc::clone(map));
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let resolved = self.resolve(path, relative);
        let asset = match self.source.load_skeleton(&resolved) {
            Ok(asset) => asset,
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Failed to acquire skeleton at '{resolved}': {e}");
                return None;
            }
        };
        let map = Arc::new(collect_transforms(&asset));
        log::debug!("Cached {} base transforms from '{resolved}'", map.len());

        // Another thread may have parsed the same asset meanwhile; keep theirs.
        let mut entries = self.entries.lock();
        let map = entries.entry(path.to_string()).or_insert(map);
        Some(Arc::clone(map))
    }

    /// Authored local transform of `node` in the skeleton at `path`.
    pub fn get_base_transform(&self, path: &str, node: &str, relative: bool) -> Option<NodeTransform> {
        self.node_map(path, relative)?.get(node).copied()
    }

    /// Look `node` up in the primary skeleton (relative to the asset root),
    /// then in each extension skeleton (paths taken as-is). First hit wins.
    pub fn get_with_extensions(
        &self,
        primary: Option<&str>,
        extensions: &[String],
        node: &str,
    ) -> Option<NodeTransform> {
        primary
            .and_then(|path| self.get_base_transform(path, node, true))
            .or_else(|| {
                extensions
                    .iter()
                    .find_map(|path| self.get_base_transform(path, node, false))
            })
    }

    /// Load `path` ahead of time. Returns whether it is now cached.
    pub fn warm(&self, path: &str, relative: bool) -> bool {
        self.node_map(path, relative).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.lock().contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl std::fmt::Debug for BasePoseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasePoseCache")
            .field("asset_root", &self.asset_root)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Flatten a skeleton into name → local transform. Later duplicates win.
fn collect_transforms(asset: &SkeletonAsset) -> NodeTransformMap {
    let mut map = NodeTransformMap::new();
    asset.walk(|node| {
        if let Some(name) = node.name.as_deref().filter(|n| !n.is_empty()) {
            map.insert(name.to_string(), node.transform);
        }
    });
    map
}
