//! Docpanel Thumbnail Cache
//!
//! Process-wide cache of document thumbnails. Entries are shared by every
//! panel showing the same document at the same size; entries nobody uses are
//! kept under an LRU byte budget.

pub mod config;
pub mod entry;
pub mod thumbnail;

pub use config::{CacheConfig, ConfigError, KEY_BACKEND, KEY_CACHE_MB, KEY_PROGRESSIVE_BLOCK};
pub use entry::{ConsumerId, DocumentId, ThumbnailEntry, ThumbnailKey};
pub use thumbnail::{
    CacheError, CacheEvent, CacheResult, CacheStats, Evicted, RendererLookup, ThumbnailCache,
};
