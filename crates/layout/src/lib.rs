//! Docpanel Layout
//!
//! Places variable-size thumbnails inside a panel whose width (or height, for
//! horizontal panels) is fixed and whose other axis scrolls. Three policies
//! are supported: linear flow, a uniform grid, and greedy masonry.

pub mod engine;
pub mod geometry;
pub mod policy;

pub use engine::LayoutEngine;
pub use geometry::{Point, Rect, Size};
pub use policy::{
    compute_layout, lane_sizes, Layout, LayoutItem, LayoutParams, LayoutPolicy, Orientation,
};
