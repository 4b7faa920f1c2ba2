//! Engine configuration.
//!
//! Loaded from JSON; every field is optional and falls back to the defaults
//! below.
//!
//! ```json
//! {
//!   "scale_mode": "average",
//!   "asset_root": "meshes",
//!   "content_suffixes": ["esp", "esm"],
//!   "session_override_name": "internal",
//!   "extension_tag": "EXTN"
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compose::ScaleMode;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Initial scale aggregation policy. Can be changed at runtime with
    /// [`TransformEngine::set_scale_mode`](crate::engine::TransformEngine::set_scale_mode).
    pub scale_mode: ScaleMode,
    /// Directory relative skeleton paths are resolved under.
    pub asset_root: String,
    /// File extensions that mark an override name as content-sourced. Such
    /// overrides are pruned after load unless the content is still loaded.
    pub content_suffixes: Vec<String>,
    /// Override name reserved for session-only state; stripped after load.
    pub session_override_name: String,
    /// Node metadata tag listing extension skeletons.
    pub extension_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scale_mode: ScaleMode::Multiply,
            asset_root: "meshes".to_string(),
            content_suffixes: vec!["esp".to_string(), "esm".to_string()],
            session_override_name: "internal".to_string(),
            extension_tag: "EXTN".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Whether `name` ends in one of the content suffixes (`"foo.esp"`).
    /// Case-insensitive; names without a `.` never match.
    pub fn is_content_name(&self, name: &str) -> bool {
        let Some((_, extension)) = name.rsplit_once('.') else {
            return false;
        };
        self.content_suffixes
            .iter()
            .any(|suffix| suffix.eq_ignore_ascii_case(extension))
    }
}
