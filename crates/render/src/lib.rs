//! Document Panel Render Library
//!
//! Host render contract, raster helpers, and progressive (block by block)
//! thumbnail generation.

pub mod progressive;
pub mod raster;
pub mod source;

pub use progressive::{
    block_size_for, FinishedCallback, GeneratorState, ProgressiveThumbnailGenerator,
    DEFAULT_BLOCK_SIZE,
};
pub use raster::{
    blank_raster, raster_byte_size, resample, PixelRect, SharedRaster, RGBA_BYTES_PER_PIXEL,
};
pub use source::{render_blocking, RegionRenderer, RenderError, RenderResult, ThumbnailBackend};
