//! Runtime configuration.
//!
//! Loaded once at startup from a RON file; every field has a default so an
//! empty document is a valid configuration.
//!
//! ```ron
//! (
//!     roots: ["~/projects", "/srv/shared"],
//!     cache: (enabled: true, ttl_ms: 60000, max_size_bytes: 10485760),
//!     search: (max_results: 200, timeout_ms: 5000),
//! )
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cache entry lifetime.
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;
/// Default content cache budget (50 MiB).
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 50 * 1024 * 1024;
/// Default number of metadata records kept.
pub const DEFAULT_METADATA_CAPACITY: usize = 4096;
/// Default cap on search results.
pub const DEFAULT_SEARCH_MAX_RESULTS: usize = 1000;
/// Default search wall-clock budget.
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 30_000;
/// Default maximum directory depth for walks.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Allowed root directories.
    pub roots: Vec<String>,
    pub cache: CacheConfig,
    pub search: SearchConfig,
}

impl FsConfig {
    /// Parse a RON document.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a RON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron(&text)
    }
}

/// Content cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum entry age in milliseconds.
    pub ttl_ms: u64,
    /// Byte budget across all cached contents.
    pub max_size_bytes: u64,
    /// Record count for the metadata-only cache.
    pub metadata_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms: DEFAULT_CACHE_TTL_MS,
            max_size_bytes: DEFAULT_CACHE_MAX_BYTES,
            metadata_capacity: DEFAULT_METADATA_CAPACITY,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// A configuration with caching switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Search defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub timeout_ms: u64,
    pub max_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_SEARCH_MAX_RESULTS,
            timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
