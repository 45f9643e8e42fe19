//! Thumbnail cache configuration
//!
//! Configuration can come from defaults, environment variables, the panel's
//! flat settings store, or be built programmatically.

use docpanel_render::{ThumbnailBackend, DEFAULT_BLOCK_SIZE, RGBA_BYTES_PER_PIXEL};
use serde::{Deserialize, Serialize};

const MB: u64 = 1024 * 1024;

/// Settings-store key for the unused-cache budget in megabytes
pub const KEY_CACHE_MB: &str = "thumbnail_cache_mb";
/// Settings-store key for the thumbnail backend
pub const KEY_BACKEND: &str = "thumbnail_backend";
/// Settings-store key for the progressive block edge in pixels
pub const KEY_PROGRESSIVE_BLOCK: &str = "progressive_block";

const ENV_CACHE_MB: &str = "DOCPANEL_CACHE_MB";
const ENV_BACKEND: &str = "DOCPANEL_THUMBNAIL_BACKEND";
const ENV_PROGRESSIVE_BLOCK: &str = "DOCPANEL_PROGRESSIVE_BLOCK";

/// Configuration for the thumbnail cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Budget for thumbnails nobody is using, in bytes
    pub max_unused_bytes: u64,
    /// Bytes per pixel used to size entries
    pub bytes_per_pixel: u32,
    /// How thumbnails are rendered on a miss
    pub backend: ThumbnailBackend,
    /// Base edge of a progressive render block in source pixels
    pub progressive_block: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_unused_bytes: 64 * MB,
            bytes_per_pixel: RGBA_BYTES_PER_PIXEL,
            backend: ThumbnailBackend::default(),
            progressive_block: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl CacheConfig {
    /// Sets the unused-cache budget in megabytes, saturating at `u64::MAX` bytes.
    pub fn with_max_unused_mb(mut self, mb: u64) -> Self {
        self.max_unused_bytes = mb.saturating_mul(MB);
        self
    }

    /// Sets the unused-cache budget in bytes.
    pub fn with_max_unused_bytes(mut self, bytes: u64) -> Self {
        self.max_unused_bytes = bytes;
        self
    }

    pub fn with_backend(mut self, backend: ThumbnailBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_progressive_block(mut self, block: u32) -> Self {
        self.progressive_block = block;
        self
    }

    /// Returns the unused-cache budget in megabytes.
    pub fn max_unused_mb(&self) -> u64 {
        self.max_unused_bytes / MB
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DOCPANEL_CACHE_MB`: unused-cache budget in MB (default: 64)
    /// - `DOCPANEL_THUMBNAIL_BACKEND`: `scaled`, `projection` or `progressive`
    /// - `DOCPANEL_PROGRESSIVE_BLOCK`: progressive block edge in pixels
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply(
            |key| std::env::var(key).ok(),
            [ENV_CACHE_MB, ENV_BACKEND, ENV_PROGRESSIVE_BLOCK],
        )
    }

    /// Loads configuration from a flat string lookup such as the settings store.
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if a present key holds an invalid value.
    pub fn from_settings(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::default().apply(lookup, [KEY_CACHE_MB, KEY_BACKEND, KEY_PROGRESSIVE_BLOCK])
    }

    fn apply(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
        [cache_mb, backend, block]: [&str; 3],
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(cache_mb) {
            self.max_unused_bytes = value
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|mb| mb.checked_mul(MB))
                .ok_or_else(|| ConfigError::InvalidValue(cache_mb.to_string()))?;
        }

        if let Some(value) = lookup(backend) {
            self.backend = value
                .parse::<ThumbnailBackend>()
                .map_err(|_| ConfigError::InvalidValue(backend.to_string()))?;
        }

        if let Some(value) = lookup(block) {
            let parsed = value
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidValue(block.to_string()))?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue(block.to_string()));
            }
            self.progressive_block = parsed;
        }

        Ok(self)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),
}
