//! Reference-counted thumbnail cache with an LRU budget on unused entries
//!
//! Entries are keyed by document and [`ThumbnailKey`]. Panels register as
//! users of the entries they display; entries with no users are kept for reuse
//! as long as their combined size fits the unused-cache budget, and the least
//! recently used of them are evicted first when it does not. Entries in use
//! are never evicted.
//!
//! The unused total is maintained incrementally. Every transition that moves
//! an entry in or out of the "valid and unused" set adjusts it. Should the
//! total ever drift (an underflow, say), it is recomputed from the entries and
//! the repair is logged.

use crate::config::CacheConfig;
use crate::entry::{ConsumerId, DocumentId, ThumbnailEntry, ThumbnailKey};
use docpanel_render::{
    render_blocking, GeneratorState, ProgressiveThumbnailGenerator, RegionRenderer, RenderError,
    SharedRaster, ThumbnailBackend,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Errors reported by cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no thumbnail {key:?} cached for {document}")]
    UnknownEntry { document: DocumentId, key: ThumbnailKey },
    #[error("rendering thumbnail for {document} failed: {source}")]
    Render {
        document: DocumentId,
        #[source]
        source: RenderError,
    },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Notifications for presentation code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// A raster for `key` is now available
    ThumbnailReady { document: DocumentId, key: ThumbnailKey },
    /// Every thumbnail of `document` went stale; repaint and re-request
    ThumbnailsInvalidated { document: DocumentId },
}

/// Resolves documents to something that can render them
///
/// Implemented by the host-side document registry. Returning `None` means the
/// document is gone; work still addressed to it is abandoned.
pub trait RendererLookup {
    fn renderer(&self, document: DocumentId) -> Option<&dyn RegionRenderer>;
}

/// An entry removed by eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted {
    pub document: DocumentId,
    pub key: ThumbnailKey,
    pub last_used: u64,
    pub byte_size: u64,
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    /// Number of entries across all documents
    pub entry_count: usize,
    /// Bytes held by valid entries nobody is using
    pub unused_bytes: u64,
    /// Budget for unused bytes
    pub max_unused_bytes: u64,
    /// Progressive renders in flight
    pub generating: usize,
    /// Requests answered from an existing entry
    pub hits: u64,
    /// Requests that created an entry
    pub misses: u64,
    /// Entries evicted to honour the budget
    pub evictions: u64,
    /// Times the unused total had to be recomputed
    pub accounting_repairs: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thumbnail cache shared by every panel in the process
///
/// Not thread-safe by design: it lives in the host's single scheduling thread.
///
/// # Example
///
/// ```
/// use docpanel_cache::{CacheConfig, ConsumerId, DocumentId, ThumbnailCache, ThumbnailKey};
/// use docpanel_render::{PixelRect, RegionRenderer, RenderResult};
/// use image::{Rgba, RgbaImage};
///
/// struct Blank;
///
/// impl RegionRenderer for Blank {
///     fn source_size(&self) -> (u32, u32) {
///         (800, 600)
///     }
///     fn render_region(&self, r: PixelRect) -> RenderResult<RgbaImage> {
///         Ok(RgbaImage::from_pixel(r.width, r.height, Rgba([255; 4])))
///     }
///     fn render_thumbnail(&self, w: u32, h: u32) -> RenderResult<RgbaImage> {
///         Ok(RgbaImage::from_pixel(w, h, Rgba([255; 4])))
///     }
/// }
///
/// let mut cache = ThumbnailCache::new(CacheConfig::default());
/// let doc = DocumentId(1);
/// let key = ThumbnailKey::new(100, 75, 800, 600);
/// let panel = ConsumerId::new();
///
/// let image = cache.request_thumbnail(doc, &Blank, key).unwrap();
/// assert!(image.is_some());
///
/// cache.add_user(panel, doc, key).unwrap();
/// assert_eq!(cache.unused_bytes(), 0);
/// cache.remove_user(panel, doc, key).unwrap();
/// assert_eq!(cache.unused_bytes(), 100 * 75 * 4);
/// ```
pub struct ThumbnailCache {
    documents: HashMap<DocumentId, HashMap<ThumbnailKey, ThumbnailEntry>>,
    unused_bytes: u64,
    clock: u64,
    config: CacheConfig,
    stats: CacheStats,
    events: Vec<CacheEvent>,
}

impl ThumbnailCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            documents: HashMap::new(),
            unused_bytes: 0,
            clock: 0,
            stats: CacheStats { max_unused_bytes: config.max_unused_bytes, ..Default::default() },
            config,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Replace the configuration, evicting if the budget shrank
    pub fn set_config(&mut self, config: CacheConfig) {
        self.config = config;
        self.stats.max_unused_bytes = self.config.max_unused_bytes;
        self.evict_excess_unused(self.config.max_unused_bytes);
    }

    /// Change the unused-cache budget, evicting immediately if needed
    pub fn set_max_unused_bytes(&mut self, max_bytes: u64) {
        self.config.max_unused_bytes = max_bytes;
        self.stats.max_unused_bytes = max_bytes;
        self.evict_excess_unused(max_bytes);
    }

    /// Return the thumbnail for `key`, rendering it on a miss
    ///
    /// A valid entry is returned as is, without touching its bookkeeping. A
    /// miss renders synchronously, or starts a progressive render when the
    /// configured backend is progressive. Until
    /// [`step_generators`](Self::step_generators) finishes it, requests return
    /// a snapshot of the blocks drawn so far, and never start a second render.
    ///
    /// Callers must not request thumbnails of zero-area documents; such
    /// requests fail with [`RenderError::EmptySource`].
    pub fn request_thumbnail(
        &mut self,
        document: DocumentId,
        renderer: &dyn RegionRenderer,
        key: ThumbnailKey,
    ) -> CacheResult<Option<SharedRaster>> {
        self.request(document, renderer, key, None)
    }

    /// Request a thumbnail and register `consumer` as its user in one step
    ///
    /// The user is added before the eviction pass, so the entry cannot be
    /// evicted between the request and the registration.
    pub fn acquire(
        &mut self,
        consumer: ConsumerId,
        document: DocumentId,
        renderer: &dyn RegionRenderer,
        key: ThumbnailKey,
    ) -> CacheResult<Option<SharedRaster>> {
        self.request(document, renderer, key, Some(consumer))
    }

    fn request(
        &mut self,
        document: DocumentId,
        renderer: &dyn RegionRenderer,
        key: ThumbnailKey,
        consumer: Option<ConsumerId>,
    ) -> CacheResult<Option<SharedRaster>> {
        let hit = self
            .entry(document, key)
            .filter(|entry| entry.valid)
            .map(ThumbnailEntry::current_image);
        if let Some(image) = hit {
            self.stats.hits += 1;
            if let Some(consumer) = consumer {
                self.add_user(consumer, document, key)?;
            }
            return Ok(image);
        }

        self.stats.misses += 1;
        let mut entry = ThumbnailEntry::new(&key, self.config.bytes_per_pixel, 0);
        match self.config.backend {
            ThumbnailBackend::Progressive => {
                let mut generator = ProgressiveThumbnailGenerator::new(
                    renderer.source_size(),
                    key.render_size(),
                    self.config.progressive_block,
                );
                generator
                    .start()
                    .map_err(|source| CacheError::Render { document, source })?;
                entry.generator = Some(generator);
            }
            backend => {
                let raster = render_blocking(renderer, backend, key.render_width, key.render_height)
                    .map_err(|source| CacheError::Render { document, source })?;
                entry.image = Some(Arc::new(raster));
            }
        }
        let image = entry.current_image();
        let ready = entry.image.is_some();

        // An invalid entry that still has users is regenerated in place and
        // keeps them.
        let previous_users = self
            .documents
            .get_mut(&document)
            .and_then(|entries| entries.remove(&key))
            .map(|stale| stale.users)
            .unwrap_or_default();
        entry.users = previous_users;
        if let Some(consumer) = consumer {
            if !entry.users.contains(&consumer) {
                entry.users.push(consumer);
            }
        }
        entry.last_used = self.tick();

        let counted = entry.counts_as_unused();
        let size = entry.byte_size;
        self.documents.entry(document).or_default().insert(key, entry);
        if counted {
            self.unused_bytes += size;
        }
        if ready {
            self.events.push(CacheEvent::ThumbnailReady { document, key });
        }
        log::debug!("cached thumbnail {:?} for {} ({} bytes)", key, document, size);

        self.evict_excess_unused(self.config.max_unused_bytes);
        Ok(image)
    }

    /// Mark every thumbnail of `document` stale
    ///
    /// Unused entries are dropped right away; entries in use stay (their
    /// users keep painting the stale raster) until their last user leaves.
    pub fn invalidate_thumbnails(&mut self, document: DocumentId) {
        let Some(entries) = self.documents.get_mut(&document) else {
            return;
        };

        let mut released = 0u64;
        entries.retain(|_, entry| {
            if entry.counts_as_unused() {
                released += entry.byte_size;
                return false;
            }
            entry.valid = false;
            if let Some(mut generator) = entry.generator.take() {
                generator.stop();
            }
            !entry.is_garbage()
        });
        if entries.is_empty() {
            self.documents.remove(&document);
        }

        self.release_unused(released);
        self.events.push(CacheEvent::ThumbnailsInvalidated { document });
        log::debug!("invalidated thumbnails of {}", document);
    }

    /// Register `consumer` as a user of an entry
    ///
    /// The first user takes the entry out of the unused total.
    pub fn add_user(
        &mut self,
        consumer: ConsumerId,
        document: DocumentId,
        key: ThumbnailKey,
    ) -> CacheResult<()> {
        let Some(entry) = self.entry_mut(document, key) else {
            log::warn!("{} added as user of missing thumbnail {:?} of {}", consumer, key, document);
            return Err(CacheError::UnknownEntry { document, key });
        };
        if entry.has_user(consumer) {
            return Ok(());
        }

        let was_unused = entry.counts_as_unused();
        entry.users.push(consumer);
        let size = entry.byte_size;
        if was_unused {
            self.release_unused(size);
        }
        Ok(())
    }

    /// Unregister `consumer` from an entry
    ///
    /// When the last user leaves, a valid entry rejoins the unused total (and
    /// may be evicted right away); an invalid one is deleted.
    pub fn remove_user(
        &mut self,
        consumer: ConsumerId,
        document: DocumentId,
        key: ThumbnailKey,
    ) -> CacheResult<()> {
        let now = self.clock + 1;
        let Some(entry) = self.entry_mut(document, key) else {
            log::warn!("{} removed as user of missing thumbnail {:?} of {}", consumer, key, document);
            return Err(CacheError::UnknownEntry { document, key });
        };
        let Some(position) = entry.users.iter().position(|user| *user == consumer) else {
            return Ok(());
        };

        entry.users.remove(position);
        if !entry.users.is_empty() {
            return Ok(());
        }

        if entry.valid {
            entry.last_used = now;
            let size = entry.byte_size;
            self.clock = now;
            self.unused_bytes += size;
            self.evict_excess_unused(self.config.max_unused_bytes);
        } else {
            self.remove_entry(document, key);
        }
        Ok(())
    }

    /// Evict least recently used unused entries until their total fits `max_bytes`
    ///
    /// Entries with users are never candidates. Returns the evicted entries in
    /// eviction order, which is oldest `last_used` first.
    pub fn evict_excess_unused(&mut self, max_bytes: u64) -> Vec<Evicted> {
        let mut evicted = Vec::new();
        while self.unused_bytes > max_bytes {
            let oldest = self
                .documents
                .iter()
                .flat_map(|(document, entries)| {
                    entries.iter().map(move |(key, entry)| (*document, *key, entry))
                })
                .filter(|(_, _, entry)| entry.counts_as_unused())
                .min_by_key(|(_, _, entry)| entry.last_used)
                .map(|(document, key, entry)| (document, key, entry.last_used));

            let Some((document, key, last_used)) = oldest else {
                log::error!(
                    "unused thumbnail total is {} bytes but no entry is unused",
                    self.unused_bytes
                );
                self.recompute_unused();
                break;
            };

            if let Some(entry) = self.remove_entry(document, key) {
                self.stats.evictions += 1;
                evicted.push(Evicted { document, key, last_used, byte_size: entry.byte_size });
            }
        }
        if !evicted.is_empty() {
            log::debug!(
                "evicted {} unused thumbnails, {} bytes unused remain",
                evicted.len(),
                self.unused_bytes
            );
        }
        evicted
    }

    /// Advance every in-flight progressive render by one block
    ///
    /// Generators whose document can no longer be resolved, or whose render
    /// fails, are stopped and their entry invalidated. Returns the number of
    /// generators still running afterwards.
    pub fn step_generators(&mut self, lookup: &dyn RendererLookup) -> usize {
        let mut running = 0;
        let mut finished = Vec::new();
        let mut failed = Vec::new();

        for (document, entries) in self.documents.iter_mut() {
            for (key, entry) in entries.iter_mut() {
                let Some(generator) = entry.generator.as_mut() else {
                    continue;
                };
                let Some(renderer) = lookup.renderer(*document) else {
                    log::warn!("dropping thumbnail render for closed document {}", document);
                    generator.stop();
                    failed.push((*document, *key));
                    continue;
                };

                match generator.step(renderer) {
                    Ok(GeneratorState::Done) => {
                        entry.image = generator.take_output().map(Arc::new);
                        entry.generator = None;
                        finished.push((*document, *key));
                    }
                    Ok(GeneratorState::Stepping) => running += 1,
                    Ok(state) => {
                        log::debug!("thumbnail render for {} ended in {:?}", document, state);
                        failed.push((*document, *key));
                    }
                    Err(err) => {
                        log::warn!("thumbnail render for {} failed: {}", document, err);
                        failed.push((*document, *key));
                    }
                }
            }
        }

        for (document, key) in finished {
            self.events.push(CacheEvent::ThumbnailReady { document, key });
        }
        for (document, key) in failed {
            self.invalidate_entry(document, key);
        }
        running
    }

    /// Drop every entry of a document that is going away
    ///
    /// Panels are expected to have released their users first; entries still
    /// in use are dropped anyway and reported.
    pub fn remove_document(&mut self, document: DocumentId) -> usize {
        let Some(mut entries) = self.documents.remove(&document) else {
            return 0;
        };

        let mut released = 0u64;
        for (key, entry) in entries.iter_mut() {
            if let Some(generator) = entry.generator.as_mut() {
                generator.stop();
            }
            if entry.counts_as_unused() {
                released += entry.byte_size;
            } else if !entry.users.is_empty() {
                log::warn!(
                    "removing thumbnail {:?} of {} while {} user(s) still hold it",
                    key,
                    document,
                    entry.users.len()
                );
            }
        }
        self.release_unused(released);
        entries.len()
    }

    /// Recompute the unused total from the entries and repair any drift
    ///
    /// Returns `true` if the incremental total was already correct.
    pub fn audit_unused_bytes(&mut self) -> bool {
        let expected = self.computed_unused();
        if expected == self.unused_bytes {
            return true;
        }
        log::error!(
            "unused thumbnail total drifted: tracked {} bytes, actual {} bytes",
            self.unused_bytes,
            expected
        );
        self.unused_bytes = expected;
        self.stats.accounting_repairs += 1;
        false
    }

    /// Take the notifications queued since the last call
    pub fn drain_events(&mut self) -> Vec<CacheEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn entry(&self, document: DocumentId, key: ThumbnailKey) -> Option<&ThumbnailEntry> {
        self.documents.get(&document)?.get(&key)
    }

    /// Every entry in the cache
    pub fn entries(&self) -> impl Iterator<Item = (DocumentId, ThumbnailKey, &ThumbnailEntry)> {
        self.documents.iter().flat_map(|(document, entries)| {
            entries.iter().map(move |(key, entry)| (*document, *key, entry))
        })
    }

    /// Keys cached for one document
    pub fn keys(&self, document: DocumentId) -> Vec<ThumbnailKey> {
        self.documents
            .get(&document)
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, document: DocumentId, key: ThumbnailKey) -> bool {
        self.entry(document, key).is_some()
    }

    pub fn entry_count(&self) -> usize {
        self.documents.values().map(HashMap::len).sum()
    }

    pub fn generating_count(&self) -> usize {
        self.entries().filter(|(_, _, entry)| entry.is_generating()).count()
    }

    /// Bytes held by valid entries with no users
    pub fn unused_bytes(&self) -> u64 {
        self.unused_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entry_count(),
            unused_bytes: self.unused_bytes,
            generating: self.generating_count(),
            ..self.stats
        }
    }

    fn entry_mut(&mut self, document: DocumentId, key: ThumbnailKey) -> Option<&mut ThumbnailEntry> {
        self.documents.get_mut(&document)?.get_mut(&key)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Remove one entry, keeping the unused total in step
    fn remove_entry(&mut self, document: DocumentId, key: ThumbnailKey) -> Option<ThumbnailEntry> {
        let entries = self.documents.get_mut(&document)?;
        let entry = entries.remove(&key)?;
        if entries.is_empty() {
            self.documents.remove(&document);
        }
        if entry.counts_as_unused() {
            self.release_unused(entry.byte_size);
        }
        Some(entry)
    }

    /// Mark one entry invalid, deleting it if nobody uses it
    fn invalidate_entry(&mut self, document: DocumentId, key: ThumbnailKey) {
        let Some(entry) = self.entry_mut(document, key) else {
            return;
        };
        if let Some(mut generator) = entry.generator.take() {
            generator.stop();
        }
        if entry.users.is_empty() {
            self.remove_entry(document, key);
        } else {
            entry.valid = false;
            self.events.push(CacheEvent::ThumbnailsInvalidated { document });
        }
    }

    fn release_unused(&mut self, bytes: u64) {
        match self.unused_bytes.checked_sub(bytes) {
            Some(remaining) => self.unused_bytes = remaining,
            None => {
                log::error!(
                    "unused thumbnail total would go negative ({} - {})",
                    self.unused_bytes,
                    bytes
                );
                self.recompute_unused();
            }
        }
    }

    fn recompute_unused(&mut self) {
        self.unused_bytes = self.computed_unused();
        self.stats.accounting_repairs += 1;
    }

    fn computed_unused(&self) -> u64 {
        self.entries()
            .filter(|(_, _, entry)| entry.counts_as_unused())
            .map(|(_, _, entry)| entry.byte_size)
            .sum()
    }
}

impl Default for ThumbnailCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
