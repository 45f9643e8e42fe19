//! Raster and region primitives shared by renderers and the thumbnail cache

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::sync::Arc;

/// Bytes per pixel of the RGBA8 rasters the panel stores
pub const RGBA_BYTES_PER_PIXEL: u32 = 4;

/// A finished thumbnail raster, shared between the cache and its consumers
///
/// Handing out an `Arc` lets two requests for the same key observe the very
/// same raster without copying pixels.
pub type SharedRaster = Arc<RgbaImage>;

/// Axis-aligned pixel region in document (source) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Region covering a whole `width` x `height` source
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Map this region from a `from` sized space into a `to` sized space
    ///
    /// Edges are mapped independently so adjacent regions map to adjacent,
    /// non-overlapping destination regions with no gaps between them.
    pub fn scale_between(&self, from: (u32, u32), to: (u32, u32)) -> PixelRect {
        let map = |value: u32, from: u32, to: u32| -> u32 {
            if from == 0 {
                0
            } else {
                ((value as u64 * to as u64) / from as u64) as u32
            }
        };
        let x0 = map(self.x, from.0, to.0);
        let y0 = map(self.y, from.1, to.1);
        let x1 = map(self.x + self.width, from.0, to.0);
        let y1 = map(self.y + self.height, from.1, to.1);
        PixelRect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

/// Memory footprint of a `width` x `height` raster
pub fn raster_byte_size(width: u32, height: u32, bytes_per_pixel: u32) -> u64 {
    width as u64 * height as u64 * bytes_per_pixel as u64
}

/// Allocate a fully transparent raster
pub fn blank_raster(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]))
}

/// Resample `source` to exactly `width` x `height`
///
/// Returns the input unchanged when it already has the requested size.
pub fn resample(source: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if source.width() == width && source.height() == height {
        return source;
    }
    imageops::resize(&source, width, height, FilterType::Triangle)
}

/// Scale `block` into `destination` at region `target`, overwriting pixels
pub fn composite_block(destination: &mut RgbaImage, block: RgbaImage, target: PixelRect) {
    if target.is_empty() {
        return;
    }
    let scaled = resample(block, target.width, target.height);
    imageops::replace(destination, &scaled, target.x as i64, target.y as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size() {
        assert_eq!(raster_byte_size(100, 50, RGBA_BYTES_PER_PIXEL), 20_000);
        assert_eq!(raster_byte_size(0, 50, RGBA_BYTES_PER_PIXEL), 0);
    }

    #[test]
    fn test_scale_between_tiles_without_gaps() {
        let from = (1000, 700);
        let to = (333, 111);
        let left = PixelRect::new(0, 0, 512, 700).scale_between(from, to);
        let right = PixelRect::new(512, 0, 488, 700).scale_between(from, to);

        assert_eq!(left.x, 0);
        assert_eq!(left.x + left.width, right.x);
        assert_eq!(right.x + right.width, 333);
        assert_eq!(left.height, 111);
    }

    #[test]
    fn test_composite_block_places_pixels() {
        let mut dest = blank_raster(4, 4);
        let block = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
        composite_block(&mut dest, block, PixelRect::new(2, 2, 2, 2));

        assert_eq!(dest.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(dest.get_pixel(3, 3), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_resample_keeps_matching_size() {
        let source = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4]));
        let out = resample(source.clone(), 3, 2);
        assert_eq!(out, source);
    }
}
