//! Presentation-side consumer of the thumbnail cache
//!
//! A panel lays out one thumbnail per tracked document and holds a cache
//! user on every thumbnail it currently shows. Entries it stops showing are
//! released, which makes them eligible for LRU eviction.

use crate::host::ViewHost;
use crate::registry::DocumentRegistry;
use docpanel_cache::{ConsumerId, DocumentId, ThumbnailCache, ThumbnailKey};
use docpanel_layout::{LayoutEngine, LayoutItem, LayoutParams, Orientation, Point, Rect, Size};
use docpanel_render::SharedRaster;
use std::collections::HashMap;
use std::ops::Range;

/// What to draw for one document
#[derive(Debug, Clone)]
pub struct PaintItem {
    pub document: DocumentId,
    pub rect: Rect,
    /// `None` while the thumbnail is still being generated
    pub image: Option<SharedRaster>,
}

#[derive(Debug)]
pub struct ThumbnailPanel {
    id: ConsumerId,
    layout: LayoutEngine,
    documents: Vec<DocumentId>,
    held: HashMap<DocumentId, ThumbnailKey>,
    scroll_offset: i32,
}

impl ThumbnailPanel {
    pub fn new(params: LayoutParams) -> Self {
        Self {
            id: ConsumerId::new(),
            layout: LayoutEngine::new(params),
            documents: Vec::new(),
            held: HashMap::new(),
            scroll_offset: 0,
        }
    }

    pub fn id(&self) -> ConsumerId {
        self.id
    }

    pub fn layout_params(&self) -> &LayoutParams {
        self.layout.params()
    }

    pub fn set_layout_params(&mut self, params: LayoutParams) {
        self.layout.set_params(params);
    }

    pub fn resize(&mut self, size: Size) {
        self.layout.set_container_size(size);
    }

    pub fn scroll_to(&mut self, offset: i32) {
        self.scroll_offset = offset.max(0);
    }

    pub fn scroll_offset(&self) -> i32 {
        self.scroll_offset
    }

    /// Documents in display order
    pub fn documents(&self) -> &[DocumentId] {
        &self.documents
    }

    /// Key this panel holds for `document`, if it shows one
    pub fn held_key(&self, document: DocumentId) -> Option<ThumbnailKey> {
        self.held.get(&document).copied()
    }

    /// Scroll range along the primary axis
    pub fn extent(&mut self) -> i32 {
        self.layout.extent()
    }

    /// Document under `point`, in viewport coordinates
    pub fn document_at(&mut self, point: Point) -> Option<DocumentId> {
        let content = match self.layout.params().orientation {
            Orientation::Vertical => Point::new(point.x, point.y + self.scroll_offset),
            Orientation::Horizontal => Point::new(point.x + self.scroll_offset, point.y),
        };
        let index = self.layout.item_at(content)?;
        self.documents.get(index).copied()
    }

    fn visible_window(&self) -> Range<i32> {
        let viewport = self.layout.params().orientation.primary(self.layout.container_size());
        let viewport = i32::try_from(viewport).unwrap_or(i32::MAX);
        self.scroll_offset..self.scroll_offset.saturating_add(viewport)
    }

    /// Bring the panel in line with the registry and the viewport
    ///
    /// Lays out every tracked document, acquires thumbnails for the ones in
    /// view and releases the rest. Failures are contained to their document:
    /// they are logged and the document is shown without a thumbnail.
    pub fn sync(
        &mut self,
        registry: &DocumentRegistry,
        host: &dyn ViewHost,
        cache: &mut ThumbnailCache,
    ) {
        let records = registry.records();
        self.documents = records.iter().map(|record| record.id()).collect();
        self.layout.set_items(
            records
                .iter()
                .map(|record| {
                    let (width, height) = record.source_size();
                    if record.has_area() {
                        LayoutItem::new(width, height)
                    } else {
                        LayoutItem::hidden(width, height)
                    }
                })
                .collect(),
        );

        let window = self.visible_window();
        let mut wanted = HashMap::new();
        for index in self.layout.visible_items(window) {
            let (Some(rect), Some(record)) = (self.layout.rect(index), records.get(index)) else {
                continue;
            };
            let (source_width, source_height) = record.source_size();
            let key = ThumbnailKey::fitted(
                rect.width.max(0) as u32,
                rect.height.max(0) as u32,
                source_width,
                source_height,
            );
            if !key.is_degenerate() {
                wanted.insert(record.id(), key);
            }
        }

        let stale: Vec<_> = self
            .held
            .iter()
            .filter(|(document, key)| wanted.get(*document) != Some(*key))
            .map(|(document, key)| (*document, *key))
            .collect();
        for (document, key) in stale {
            self.held.remove(&document);
            if let Err(err) = cache.remove_user(self.id, document, key) {
                log::debug!("{} had already lost {:?}: {}", self.id, key, err);
            }
        }

        let mut wanted: Vec<_> = wanted.into_iter().collect();
        wanted.sort();
        for (document, key) in wanted {
            let needs_render = match self.held.get(&document) {
                Some(_) => cache.entry(document, key).map_or(true, |entry| !entry.is_valid()),
                None => true,
            };
            if !needs_render {
                continue;
            }
            let Some(handle) = host.document(document) else {
                log::warn!("{} cannot render {}: document is gone", self.id, document);
                continue;
            };
            match cache.acquire(self.id, document, handle.as_renderer(), key) {
                Ok(_) => {
                    self.held.insert(document, key);
                }
                Err(err) => log::warn!("thumbnail for {} failed: {}", document, err),
            }
        }
    }

    /// Drop the cache user held for `document`
    ///
    /// Called before the registry deletes the document's record.
    pub fn release_document(&mut self, document: DocumentId, cache: &mut ThumbnailCache) {
        if let Some(key) = self.held.remove(&document) {
            if let Err(err) = cache.remove_user(self.id, document, key) {
                log::debug!("{} had already lost {:?}: {}", self.id, key, err);
            }
        }
    }

    /// Release everything, e.g. when the panel closes
    pub fn release_all(&mut self, cache: &mut ThumbnailCache) {
        for (document, key) in self.held.drain() {
            if let Err(err) = cache.remove_user(self.id, document, key) {
                log::debug!("{} had already lost {:?}: {}", self.id, key, err);
            }
        }
    }

    /// Rectangles and rasters of the documents in view, in viewport order
    pub fn paint_items(&mut self, cache: &ThumbnailCache) -> Vec<PaintItem> {
        let window = self.visible_window();
        let mut items = Vec::new();
        for index in self.layout.visible_items(window) {
            let (Some(rect), Some(document)) = (self.layout.rect(index), self.documents.get(index))
            else {
                continue;
            };
            let image = self
                .held
                .get(document)
                .and_then(|key| cache.entry(*document, *key))
                .and_then(|entry| entry.image().cloned());
            items.push(PaintItem { document: *document, rect, image });
        }
        items
    }
}
