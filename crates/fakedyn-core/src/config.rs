//! Engine configuration.
//!
//! Every limit the engine enforces lives here so a deployment can loosen or
//! tighten it without touching code. All fields default to the values the
//! hosted service uses.

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{
    DEFAULT_REQUEST_SIZE_LIMIT, DEFAULT_RESPONSE_SIZE_LIMIT, MAX_BATCH_GET_KEYS,
    MAX_BATCH_WRITE_ITEMS, MAX_ITEM_SIZE,
};

/// Default log size that triggers compaction (64 MB).
pub const DEFAULT_COMPACTION_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Controls when `fsync` is called after a log append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fsync after every appended record (default). Maximum durability.
    #[default]
    Full,
    /// Leave flushing to the OS. Records may be lost on crash.
    None,
}

/// Limits and persistence settings for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Byte budget shared by one Query/Scan page or one BatchGetItem
    /// response. Default: 1 MB.
    pub response_size_limit: usize,

    /// Maximum serialized size of a request payload. Default: 1 MB.
    pub request_size_limit: usize,

    /// Maximum encoded size of one item. Default: 400 KB.
    pub max_item_size: usize,

    /// Maximum put/delete requests per BatchWriteItem. Default: 25.
    pub max_batch_write: usize,

    /// Maximum keys per BatchGetItem. Default: 100.
    pub max_batch_get: usize,

    pub log: LogConfig,
}

/// Persistence log settings. With no `path` the engine is memory-only.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub path: Option<PathBuf>,
    pub compaction_threshold: u64,
    pub sync: SyncMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_size_limit: DEFAULT_RESPONSE_SIZE_LIMIT,
            request_size_limit: DEFAULT_REQUEST_SIZE_LIMIT,
            max_item_size: MAX_ITEM_SIZE,
            max_batch_write: MAX_BATCH_WRITE_ITEMS,
            max_batch_get: MAX_BATCH_GET_KEYS,
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: None,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            sync: SyncMode::Full,
        }
    }
}

impl EngineConfig {
    /// Configuration persisting to the log file at `path`.
    pub fn with_log(path: impl Into<PathBuf>) -> Self {
        Self {
            log: LogConfig {
                path: Some(path.into()),
                ..LogConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.response_size_limit, 1024 * 1024);
        assert_eq!(config.request_size_limit, 1024 * 1024);
        assert_eq!(config.max_item_size, 400 * 1024);
        assert_eq!(config.max_batch_write, 25);
        assert_eq!(config.max_batch_get, 100);
        assert!(config.log.path.is_none());
        assert_eq!(config.log.sync, SyncMode::Full);
    }

    #[test]
    fn test_partial_override() {
        let config: EngineConfig = serde_json::from_value(json!({
            "response_size_limit": 2048,
            "log": { "path": "/tmp/fakedyn.log", "sync": "none" }
        }))
        .unwrap();
        assert_eq!(config.response_size_limit, 2048);
        assert_eq!(config.max_batch_write, 25);
        assert_eq!(config.log.path, Some(PathBuf::from("/tmp/fakedyn.log")));
        assert_eq!(config.log.sync, SyncMode::None);
        assert_eq!(config.log.compaction_threshold, DEFAULT_COMPACTION_THRESHOLD);
    }

    #[test]
    fn test_with_log() {
        let config = EngineConfig::with_log("data.log");
        assert_eq!(config.log.path, Some(PathBuf::from("data.log")));
        assert_eq!(config.max_item_size, MAX_ITEM_SIZE);
    }
}
