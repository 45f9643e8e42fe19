//! Cache keys, consumer identities, and entries

use docpanel_render::{raster_byte_size, ProgressiveThumbnailGenerator, SharedRaster};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Host-supplied identity of an open document
///
/// Two handles to the same document compare equal; this is identity, not a
/// copy of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Fingerprint of a cached raster: requested size plus source size
///
/// Two requests with the same key always share one cache entry. The source
/// size is part of the key so a resized document never reuses a stale raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThumbnailKey {
    pub render_width: u32,
    pub render_height: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl ThumbnailKey {
    pub fn new(render_width: u32, render_height: u32, source_width: u32, source_height: u32) -> Self {
        Self { render_width, render_height, source_width, source_height }
    }

    /// Key for a thumbnail that fits `max_width` x `max_height` while keeping
    /// the source's aspect ratio
    pub fn fitted(max_width: u32, max_height: u32, source_width: u32, source_height: u32) -> Self {
        if source_width == 0 || source_height == 0 {
            return Self::new(0, 0, source_width, source_height);
        }
        let scale_w = max_width as f64 / source_width as f64;
        let scale_h = max_height as f64 / source_height as f64;
        let scale = scale_w.min(scale_h);
        let width = ((source_width as f64 * scale).round() as u32).clamp(1, max_width.max(1));
        let height = ((source_height as f64 * scale).round() as u32).clamp(1, max_height.max(1));
        Self::new(width, height, source_width, source_height)
    }

    pub fn render_size(&self) -> (u32, u32) {
        (self.render_width, self.render_height)
    }

    pub fn source_size(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }

    /// Check if either the rendered or the source area is zero
    pub fn is_degenerate(&self) -> bool {
        self.render_width == 0
            || self.render_height == 0
            || self.source_width == 0
            || self.source_height == 0
    }
}

/// Identity of a cache consumer (a panel instance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0.simple())
    }
}

/// One cached thumbnail of one document
#[derive(Debug)]
pub struct ThumbnailEntry {
    pub(crate) image: Option<SharedRaster>,
    pub(crate) valid: bool,
    pub(crate) users: Vec<ConsumerId>,
    pub(crate) last_used: u64,
    pub(crate) byte_size: u64,
    pub(crate) generator: Option<ProgressiveThumbnailGenerator>,
}

impl ThumbnailEntry {
    pub(crate) fn new(key: &ThumbnailKey, bytes_per_pixel: u32, last_used: u64) -> Self {
        Self {
            image: None,
            valid: true,
            users: Vec::new(),
            last_used,
            byte_size: raster_byte_size(key.render_width, key.render_height, bytes_per_pixel),
            generator: None,
        }
    }

    /// The raster, `None` while it is still being generated
    pub fn image(&self) -> Option<&SharedRaster> {
        self.image.as_ref()
    }

    /// The finished raster, or a copy of what an in-flight render has drawn
    pub fn current_image(&self) -> Option<SharedRaster> {
        self.image.clone().or_else(|| {
            self.generator
                .as_ref()
                .and_then(|generator| generator.partial_output())
                .map(|partial| SharedRaster::new(partial.clone()))
        })
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn users(&self) -> &[ConsumerId] {
        &self.users
    }

    pub fn has_user(&self, consumer: ConsumerId) -> bool {
        self.users.contains(&consumer)
    }

    /// Monotonic timestamp of the last time the entry became unused
    pub fn last_used(&self) -> u64 {
        self.last_used
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn is_generating(&self) -> bool {
        self.generator.is_some()
    }

    /// Progress of an in-flight progressive render (1.0 when finished)
    pub fn progress(&self) -> f64 {
        match &self.generator {
            Some(generator) => generator.progress(),
            None if self.image.is_some() => 1.0,
            None => 0.0,
        }
    }

    /// Whether the entry's bytes belong in the unused-cache total
    pub fn counts_as_unused(&self) -> bool {
        self.users.is_empty() && self.valid
    }

    /// Invalid and unused: nothing will ever read this entry again
    pub(crate) fn is_garbage(&self) -> bool {
        self.users.is_empty() && !self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fitted_key_keeps_aspect_ratio() {
        let key = ThumbnailKey::fitted(100, 100, 800, 600);
        assert_eq!(key.render_size(), (100, 75));
        assert_eq!(key.source_size(), (800, 600));

        let tall = ThumbnailKey::fitted(100, 100, 300, 1200);
        assert_eq!(tall.render_size(), (25, 100));
    }

    #[test]
    fn test_fitted_key_for_empty_source_is_degenerate() {
        assert!(ThumbnailKey::fitted(100, 100, 0, 600).is_degenerate());
        assert!(!ThumbnailKey::new(1, 1, 1, 1).is_degenerate());
    }

    #[test]
    fn test_entry_size_from_render_geometry() {
        let key = ThumbnailKey::new(100, 50, 1000, 500);
        let entry = ThumbnailEntry::new(&key, 4, 7);
        assert_eq!(entry.byte_size(), 20_000);
        assert_eq!(entry.last_used(), 7);
        assert!(entry.counts_as_unused());
        assert!(!entry.is_garbage());
        assert_eq!(entry.progress(), 0.0);
    }

    #[test]
    fn test_consumer_ids_are_unique() {
        assert_ne!(ConsumerId::new(), ConsumerId::new());
    }
}
