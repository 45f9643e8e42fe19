//! Layout policies and the packing itself
//!
//! Every policy works in two axes: the *cross* axis, fixed by the container
//! (its width for a vertical panel), and the *primary* axis, which is
//! unbounded and scrolls. Items are scaled to the cross size they are given
//! and keep their aspect ratio along the primary axis.

use crate::geometry::{Rect, Size};
use serde::{Deserialize, Serialize};

/// Direction the panel scrolls in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Fixed width, items flow downwards
    #[default]
    Vertical,
    /// Fixed height, items flow to the right
    Horizontal,
}

impl Orientation {
    /// Length of `size` along the fixed axis
    pub fn cross(&self, size: Size) -> u32 {
        match self {
            Orientation::Vertical => size.width,
            Orientation::Horizontal => size.height,
        }
    }

    /// Length of `size` along the scrolling axis
    pub fn primary(&self, size: Size) -> u32 {
        match self {
            Orientation::Vertical => size.height,
            Orientation::Horizontal => size.width,
        }
    }

    fn rect(&self, cross_pos: i32, primary_pos: i32, cross_len: i32, primary_len: i32) -> Rect {
        match self {
            Orientation::Vertical => Rect::new(cross_pos, primary_pos, cross_len, primary_len),
            Orientation::Horizontal => Rect::new(primary_pos, cross_pos, primary_len, cross_len),
        }
    }
}

/// How items are packed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayoutPolicy {
    /// End to end along the primary axis at natural size, one item per row
    #[default]
    Linear,

    /// Fixed number of lanes filled row by row
    ///
    /// With `stretch` every item fills a square cell; otherwise each item is
    /// scaled to its lane width and a row is as tall as its tallest item.
    Grid { stretch: bool },

    /// Each item goes to the currently shortest lane
    Masonry,
}

/// Parameters shared by all policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayoutParams {
    pub policy: LayoutPolicy,
    /// Number of lanes for grid and masonry; zero is treated as one
    pub lanes: u32,
    /// Gap between items and between lanes, in pixels
    pub spacing: u32,
    pub orientation: Orientation,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            policy: LayoutPolicy::Linear,
            lanes: 2,
            spacing: 4,
            orientation: Orientation::Vertical,
        }
    }
}

impl LayoutParams {
    pub fn with_policy(mut self, policy: LayoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_lanes(mut self, lanes: u32) -> Self {
        self.lanes = lanes;
        self
    }

    pub fn with_spacing(mut self, spacing: u32) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }
}

/// One item to place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutItem {
    /// Intrinsic size; only its aspect ratio matters outside linear flow
    pub size: Size,
    /// Hidden items get no rectangle and take no space
    pub visible: bool,
}

impl LayoutItem {
    pub fn new(width: u32, height: u32) -> Self {
        Self { size: Size::new(width, height), visible: true }
    }

    pub fn hidden(width: u32, height: u32) -> Self {
        Self { size: Size::new(width, height), visible: false }
    }
}

/// Result of a layout pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layout {
    /// One slot per input item, `None` for hidden items
    pub rects: Vec<Option<Rect>>,
    /// Furthest item edge along the primary axis (the scroll range)
    pub extent: i32,
    /// Furthest item edge of each lane; linear flow has a single lane
    pub lane_extents: Vec<i32>,
}

impl Layout {
    pub fn rect(&self, index: usize) -> Option<Rect> {
        self.rects.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Placed items with their index
    pub fn placed(&self) -> impl Iterator<Item = (usize, Rect)> + '_ {
        self.rects.iter().enumerate().filter_map(|(index, rect)| rect.map(|rect| (index, rect)))
    }
}

/// Pack `items` into a container whose cross axis is `container_cross` pixels
///
/// Deterministic: identical arguments always produce identical rectangles.
pub fn compute_layout(items: &[LayoutItem], container_cross: u32, params: &LayoutParams) -> Layout {
    let cross = clamp_i32(container_cross as u64);
    let spacing = clamp_i32(params.spacing as u64);
    let lanes = params.lanes.max(1) as usize;

    match params.policy {
        LayoutPolicy::Linear => linear(items, cross, spacing, params.orientation),
        LayoutPolicy::Grid { stretch } => {
            grid(items, cross, lanes, spacing, stretch, params.orientation)
        }
        LayoutPolicy::Masonry => masonry(items, cross, lanes, spacing, params.orientation),
    }
}

/// Split `available` pixels into `lanes` lane widths separated by `spacing`
///
/// Leftover pixels go to the first lanes, one each.
pub fn lane_sizes(available: i32, lanes: usize, spacing: i32) -> Vec<i32> {
    let lanes = lanes.max(1);
    let spacing_total = spacing.saturating_mul(lanes as i32 - 1);
    let without_spacing = (available - spacing_total).max(0);
    let base = without_spacing / lanes as i32;
    let remainder = without_spacing % lanes as i32;
    (0..lanes)
        .map(|index| base + i32::from((index as i32) < remainder))
        .collect()
}

fn lane_positions(sizes: &[i32], spacing: i32) -> Vec<i32> {
    let mut cursor: i32 = 0;
    sizes
        .iter()
        .map(|size| {
            let position = cursor;
            cursor = cursor.saturating_add(*size).saturating_add(spacing);
            position
        })
        .collect()
}

/// First lane with the smallest offset
fn find_shortest_lane(offsets: &[i32]) -> usize {
    let mut best = 0;
    for (index, offset) in offsets.iter().enumerate().skip(1) {
        if *offset < offsets[best] {
            best = index;
        }
    }
    best
}

/// Primary-axis length of `size` once scaled to `cross` pixels across
fn scaled_primary(size: Size, cross: i32, orientation: Orientation) -> i32 {
    let natural_cross = orientation.cross(size) as i64;
    if natural_cross == 0 || cross <= 0 {
        return 0;
    }
    let natural_primary = orientation.primary(size) as i64;
    let scaled = (natural_primary as i128 * cross as i128 * 2 + natural_cross as i128)
        / (natural_cross as i128 * 2);
    clamp_i32(u64::try_from(scaled).unwrap_or(u64::MAX))
}

fn clamp_i32(value: u64) -> i32 {
    value.min(i32::MAX as u64) as i32
}

fn linear(items: &[LayoutItem], cross: i32, spacing: i32, orientation: Orientation) -> Layout {
    let mut rects = Vec::with_capacity(items.len());
    let mut cursor = 0;
    let mut extent = 0;

    for item in items {
        if !item.visible {
            rects.push(None);
            continue;
        }
        let natural_cross = clamp_i32(orientation.cross(item.size) as u64);
        let (cross_len, primary_len) = if natural_cross > cross {
            (cross, scaled_primary(item.size, cross, orientation))
        } else {
            (natural_cross, clamp_i32(orientation.primary(item.size) as u64))
        };
        rects.push(Some(orientation.rect(0, cursor, cross_len, primary_len)));
        extent = cursor.saturating_add(primary_len);
        cursor = extent.saturating_add(spacing);
    }

    Layout { rects, extent, lane_extents: vec![extent] }
}

fn grid(
    items: &[LayoutItem],
    cross: i32,
    lanes: usize,
    spacing: i32,
    stretch: bool,
    orientation: Orientation,
) -> Layout {
    let sizes = lane_sizes(cross, lanes, spacing);
    let positions = lane_positions(&sizes, spacing);
    let mut lane_extents = vec![0; lanes];
    let mut rects = Vec::with_capacity(items.len());

    let mut row_start: i32 = 0;
    let mut row_length = 0;
    let mut lane = 0;

    for item in items {
        if !item.visible {
            rects.push(None);
            continue;
        }
        if lane == lanes {
            row_start = row_start.saturating_add(row_length).saturating_add(spacing);
            row_length = 0;
            lane = 0;
        }

        let width = sizes[lane];
        let length = if stretch { width } else { scaled_primary(item.size, width, orientation) };
        rects.push(Some(orientation.rect(positions[lane], row_start, width, length)));
        lane_extents[lane] = row_start.saturating_add(length);
        row_length = row_length.max(length);
        lane += 1;
    }

    let extent = lane_extents.iter().copied().max().unwrap_or(0);
    Layout { rects, extent, lane_extents }
}

/// Greedy shortest-lane packing
///
/// An item's footprint in its lane is its length plus the gap after it, so
/// the longest lane never ends more than one footprint (the largest item plus
/// `spacing`) past the shortest one.
fn masonry(
    items: &[LayoutItem],
    cross: i32,
    lanes: usize,
    spacing: i32,
    orientation: Orientation,
) -> Layout {
    let sizes = lane_sizes(cross, lanes, spacing);
    let positions = lane_positions(&sizes, spacing);
    let mut offsets = vec![0; lanes];
    let mut lane_extents = vec![0; lanes];
    let mut rects = Vec::with_capacity(items.len());

    for item in items {
        if !item.visible {
            rects.push(None);
            continue;
        }
        let lane = find_shortest_lane(&offsets);
        let width = sizes[lane];
        let length = scaled_primary(item.size, width, orientation);
        rects.push(Some(orientation.rect(positions[lane], offsets[lane], width, length)));
        lane_extents[lane] = offsets[lane].saturating_add(length);
        offsets[lane] = lane_extents[lane].saturating_add(spacing);
    }

    let extent = lane_extents.iter().copied().max().unwrap_or(0);
    Layout { rects, extent, lane_extents }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_items(rng: &mut StdRng, count: usize) -> Vec<LayoutItem> {
        (0..count)
            .map(|_| LayoutItem::new(rng.gen_range(1..400), rng.gen_range(1..800)))
            .collect()
    }

    #[test]
    fn test_lane_sizes_distribute_remainder() {
        assert_eq!(lane_sizes(100, 3, 2), vec![32, 32, 32]);
        assert_eq!(lane_sizes(101, 3, 0), vec![34, 34, 33]);
        assert_eq!(lane_sizes(4, 3, 10), vec![0, 0, 0]);
    }

    #[test]
    fn test_shortest_lane_prefers_first_minimum() {
        assert_eq!(find_shortest_lane(&[5, 2, 2, 9]), 1);
        assert_eq!(find_shortest_lane(&[0, 0]), 0);
    }

    #[test]
    fn test_linear_flow_places_items_end_to_end() {
        let items = [LayoutItem::new(100, 50), LayoutItem::new(80, 30)];
        let layout = compute_layout(&items, 200, &LayoutParams::default().with_spacing(10));

        assert_eq!(layout.rect(0), Some(Rect::new(0, 0, 100, 50)));
        assert_eq!(layout.rect(1), Some(Rect::new(0, 60, 80, 30)));
        assert_eq!(layout.extent, 90);
    }

    #[test]
    fn test_linear_flow_shrinks_items_wider_than_container() {
        let items = [LayoutItem::new(400, 300)];
        let layout = compute_layout(&items, 200, &LayoutParams::default());
        assert_eq!(layout.rect(0), Some(Rect::new(0, 0, 200, 150)));
    }

    #[test]
    fn test_horizontal_linear_flow() {
        let items = [LayoutItem::new(100, 50), LayoutItem::new(80, 30)];
        let params = LayoutParams::default()
            .with_spacing(0)
            .with_orientation(Orientation::Horizontal);
        let layout = compute_layout(&items, 100, &params);

        assert_eq!(layout.rect(0), Some(Rect::new(0, 0, 100, 50)));
        assert_eq!(layout.rect(1), Some(Rect::new(100, 0, 80, 30)));
        assert_eq!(layout.extent, 180);
    }

    #[test]
    fn test_hidden_items_take_no_space() {
        let items = [LayoutItem::new(10, 10), LayoutItem::hidden(10, 10), LayoutItem::new(10, 10)];
        let layout = compute_layout(&items, 100, &LayoutParams::default().with_spacing(0));

        assert_eq!(layout.rect(1), None);
        assert_eq!(layout.rect(2), Some(Rect::new(0, 10, 10, 10)));
        assert_eq!(layout.placed().count(), 2);
    }

    #[test]
    fn test_stretched_grid_uses_square_cells() {
        let items: Vec<_> = (0..5).map(|_| LayoutItem::new(300, 100)).collect();
        let params = LayoutParams::default()
            .with_policy(LayoutPolicy::Grid { stretch: true })
            .with_lanes(2)
            .with_spacing(10);
        let layout = compute_layout(&items, 210, &params);

        assert_eq!(layout.rect(0), Some(Rect::new(0, 0, 100, 100)));
        assert_eq!(layout.rect(1), Some(Rect::new(110, 0, 100, 100)));
        assert_eq!(layout.rect(2), Some(Rect::new(0, 110, 100, 100)));
        assert_eq!(layout.rect(4), Some(Rect::new(0, 220, 100, 100)));
        assert_eq!(layout.extent, 320);
        assert_eq!(layout.lane_extents, vec![320, 210]);
    }

    #[test]
    fn test_grid_row_is_as_tall_as_its_tallest_item() {
        let items = [LayoutItem::new(100, 50), LayoutItem::new(100, 200), LayoutItem::new(100, 100)];
        let params = LayoutParams::default()
            .with_policy(LayoutPolicy::Grid { stretch: false })
            .with_lanes(2)
            .with_spacing(0);
        let layout = compute_layout(&items, 200, &params);

        assert_eq!(layout.rect(0), Some(Rect::new(0, 0, 100, 50)));
        assert_eq!(layout.rect(1), Some(Rect::new(100, 0, 100, 200)));
        assert_eq!(layout.rect(2), Some(Rect::new(0, 200, 100, 100)));
    }

    #[test]
    fn test_masonry_fills_shortest_lane() {
        let items = [
            LayoutItem::new(100, 300),
            LayoutItem::new(100, 100),
            LayoutItem::new(100, 100),
            LayoutItem::new(100, 100),
        ];
        let params = LayoutParams::default()
            .with_policy(LayoutPolicy::Masonry)
            .with_lanes(2)
            .with_spacing(0);
        let layout = compute_layout(&items, 200, &params);

        assert_eq!(layout.rect(0), Some(Rect::new(0, 0, 100, 300)));
        assert_eq!(layout.rect(1), Some(Rect::new(100, 0, 100, 100)));
        assert_eq!(layout.rect(2), Some(Rect::new(100, 100, 100, 100)));
        assert_eq!(layout.rect(3), Some(Rect::new(100, 200, 100, 100)));
        assert_eq!(layout.lane_extents, vec![300, 300]);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let items = random_items(&mut rng, 200);
        for policy in [
            LayoutPolicy::Linear,
            LayoutPolicy::Grid { stretch: false },
            LayoutPolicy::Grid { stretch: true },
            LayoutPolicy::Masonry,
        ] {
            let params = LayoutParams::default().with_policy(policy).with_lanes(3);
            assert_eq!(compute_layout(&items, 640, &params), compute_layout(&items, 640, &params));
        }
    }

    #[test]
    fn test_masonry_lane_imbalance_is_bounded_by_largest_footprint() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let lanes = rng.gen_range(1..6);
            let count = rng.gen_range(0..120);
            let spacing = if rng.gen_bool(0.2) { 0 } else { rng.gen_range(1..120) };
            let items = random_items(&mut rng, count);
            let params = LayoutParams::default()
                .with_policy(LayoutPolicy::Masonry)
                .with_lanes(lanes)
                .with_spacing(spacing);
            let layout = compute_layout(&items, 500, &params);

            let largest = layout.placed().map(|(_, rect)| rect.height).max().unwrap_or(0);
            let longest = layout.lane_extents.iter().max().copied().unwrap_or(0);
            let shortest = layout.lane_extents.iter().min().copied().unwrap_or(0);
            assert!(
                longest - shortest <= largest + spacing as i32,
                "lanes {:?} spacing {}",
                layout.lane_extents,
                spacing
            );
        }
    }

    #[test]
    fn test_masonry_spacing_counts_as_part_of_the_item() {
        let items = [LayoutItem::new(100, 1); 3];
        let params = LayoutParams::default()
            .with_policy(LayoutPolicy::Masonry)
            .with_lanes(2)
            .with_spacing(100);
        let layout = compute_layout(&items, 300, &params);

        assert_eq!(layout.lane_extents, vec![102, 1]);
        assert_eq!(layout.rect(2), Some(Rect::new(0, 101, 100, 1)));
    }

    #[test]
    fn test_huge_items_saturate_instead_of_overflowing() {
        let items = vec![LayoutItem::new(1, 100_000_000); 30];
        for policy in [
            LayoutPolicy::Linear,
            LayoutPolicy::Grid { stretch: false },
            LayoutPolicy::Grid { stretch: true },
            LayoutPolicy::Masonry,
        ] {
            let params = LayoutParams::default().with_policy(policy).with_lanes(2);
            let layout = compute_layout(&items, 100, &params);
            assert_eq!(layout.placed().count(), 30);
            assert!(layout.extent > 0);
        }

        let linear = compute_layout(&items, 100, &LayoutParams::default());
        assert_eq!(linear.extent, i32::MAX);

        let tall = [LayoutItem::new(1, u32::MAX)];
        let params = LayoutParams::default().with_policy(LayoutPolicy::Masonry).with_lanes(1);
        assert_eq!(compute_layout(&tall, u32::MAX, &params).extent, i32::MAX);
    }

    #[test]
    fn test_placed_rects_never_overlap() {
        let mut rng = StdRng::seed_from_u64(3);
        let items = random_items(&mut rng, 60);
        for policy in [LayoutPolicy::Grid { stretch: false }, LayoutPolicy::Masonry] {
            let params = LayoutParams::default().with_policy(policy).with_lanes(4);
            let rects: Vec<_> = compute_layout(&items, 400, &params)
                .placed()
                .map(|(_, rect)| rect)
                .filter(|rect| rect.width > 0 && rect.height > 0)
                .collect();
            for (i, a) in rects.iter().enumerate() {
                for b in &rects[i + 1..] {
                    assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
                }
            }
        }
    }

    #[test]
    fn test_zero_lanes_behave_like_one() {
        let items = [LayoutItem::new(10, 10), LayoutItem::new(10, 10)];
        let params = LayoutParams::default().with_policy(LayoutPolicy::Masonry).with_lanes(0);
        let layout = compute_layout(&items, 50, &params);
        assert_eq!(layout.lane_extents.len(), 1);
    }
}
