//! Error types.
//!
//! Lookups that miss (unknown handle, node, override name) are not errors and
//! surface as `None`/`false`. The enums here cover the failures that carry a
//! cause worth logging: unreadable skeleton assets, corrupt persisted streams,
//! and bad configuration files.

use thiserror::Error;

/// Failure to load or parse a skeleton asset.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("failed to read asset '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse asset '{path}': {reason}")]
    Parse { path: String, reason: String },
}

/// Failure while reading or writing the persisted record stream.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("record data truncated while reading {0}")]
    Truncated(&'static str),

    #[error("unexpected record tag {tag:?} (expected {expected:?})")]
    UnexpectedRecord { tag: String, expected: &'static str },

    #[error("unsupported record version {found} (newest known is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("unknown override key code {0}")]
    UnknownKey(u16),

    #[error("unknown override payload type {0}")]
    UnknownPayload(u8),

    #[error("invalid slot index {0}")]
    InvalidSlot(u8),

    #[error("string of {len} bytes exceeds the {max}-byte record limit")]
    StringTooLong { len: usize, max: usize },

    #[error("string data is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("no record is open")]
    NoOpenRecord,
}

/// Failure to load an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}
