//! Cached layout with explicit invalidation
//!
//! Packing many items in grid or masonry mode is too expensive to redo on
//! every paint. The engine keeps the last result and recomputes it only when
//! one of its inputs changes or presentation calls [`LayoutEngine::invalidate`].

use crate::geometry::{Point, Rect, Size};
use crate::policy::{compute_layout, Layout, LayoutItem, LayoutParams, Orientation};
use std::ops::Range;

#[derive(Debug, Default)]
pub struct LayoutEngine {
    params: LayoutParams,
    container: Size,
    items: Vec<LayoutItem>,
    cached: Option<Layout>,
    computations: u64,
}

impl LayoutEngine {
    pub fn new(params: LayoutParams) -> Self {
        Self { params, ..Default::default() }
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    pub fn set_params(&mut self, params: LayoutParams) {
        if self.params != params {
            self.params = params;
            self.invalidate();
        }
    }

    /// Update the container size
    ///
    /// Only a change along the fixed axis affects the layout; the scrolling
    /// axis only changes what is visible.
    pub fn set_container_size(&mut self, size: Size) {
        let orientation = self.params.orientation;
        if orientation.cross(self.container) != orientation.cross(size) {
            self.invalidate();
        }
        self.container = size;
    }

    pub fn container_size(&self) -> Size {
        self.container
    }

    /// Replace the item list; the layout is kept if nothing changed
    pub fn set_items(&mut self, items: Vec<LayoutItem>) {
        if self.items != items {
            self.items = items;
            self.invalidate();
        }
    }

    /// Update a single item, returning `false` if `index` is out of range
    pub fn set_item(&mut self, index: usize, item: LayoutItem) -> bool {
        let Some(slot) = self.items.get_mut(index) else {
            return false;
        };
        if *slot != item {
            *slot = item;
            self.invalidate();
        }
        true
    }

    pub fn items(&self) -> &[LayoutItem] {
        &self.items
    }

    /// Drop the cached layout so the next query recomputes it
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.cached.is_none()
    }

    /// Number of times the layout has been computed
    pub fn computations(&self) -> u64 {
        self.computations
    }

    /// Current layout, computing it if needed
    pub fn layout(&mut self) -> &Layout {
        let cross = self.params.orientation.cross(self.container);
        let (items, params, computations) = (&self.items, &self.params, &mut self.computations);
        self.cached.get_or_insert_with(|| {
            *computations += 1;
            log::debug!("laying out {} items ({:?})", items.len(), params.policy);
            compute_layout(items, cross, params)
        })
    }

    pub fn rect(&mut self, index: usize) -> Option<Rect> {
        self.layout().rect(index)
    }

    /// Scroll range along the primary axis
    pub fn extent(&mut self) -> i32 {
        self.layout().extent
    }

    /// Index of the item under `point`, in content coordinates
    pub fn item_at(&mut self, point: Point) -> Option<usize> {
        self.layout()
            .placed()
            .find(|(_, rect)| rect.contains(point))
            .map(|(index, _)| index)
    }

    /// Indices of items intersecting the window `visible` along the primary axis
    ///
    /// The window is typically `scroll_offset..scroll_offset + viewport_length`.
    pub fn visible_items(&mut self, visible: Range<i32>) -> Vec<usize> {
        let orientation = self.params.orientation;
        self.layout()
            .placed()
            .filter(|(_, rect)| {
                let (start, end) = match orientation {
                    Orientation::Vertical => (rect.y, rect.bottom()),
                    Orientation::Horizontal => (rect.x, rect.right()),
                };
                start < visible.end && end > visible.start
            })
            .map(|(index, _)| index)
            .collect()
    }
}
