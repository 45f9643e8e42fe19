//! Host render contract
//!
//! The host owns the document model and its rendering backend. The panel only
//! needs two primitives from it: a cheap pre-scaled thumbnail and a region
//! render of the full-resolution projection.

use crate::raster::{resample, PixelRect};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors produced while rendering thumbnails
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("source has zero area ({width}x{height})")]
    EmptySource { width: u32, height: u32 },
    #[error("host render failed: {0}")]
    Host(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Something that can produce rasters of a document
///
/// Implemented by the host's document handle. All calls happen on the host's
/// scheduling thread and must return promptly; expensive renders are split
/// into blocks by [`crate::ProgressiveThumbnailGenerator`].
pub trait RegionRenderer {
    /// Full-resolution size of the document in pixels
    fn source_size(&self) -> (u32, u32);

    /// Render `region` of the full-resolution projection
    ///
    /// The result is expected to be `region.width` x `region.height`; callers
    /// resample anything else.
    fn render_region(&self, region: PixelRect) -> RenderResult<RgbaImage>;

    /// Produce a cheap, coarse thumbnail of the whole document
    fn render_thumbnail(&self, width: u32, height: u32) -> RenderResult<RgbaImage>;

    /// Let the host finish queued work (e.g. stroke processing) before a render
    fn wait_for_pending_work(&self) {}
}

/// How a thumbnail is produced on a cache miss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailBackend {
    /// Host's scaled thumbnail: cheap and coarse
    #[default]
    Scaled,

    /// Full projection render scaled down in one blocking call
    Projection,

    /// Full projection render split into blocks over many scheduler turns
    Progressive,
}

impl ThumbnailBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThumbnailBackend::Scaled => "scaled",
            ThumbnailBackend::Projection => "projection",
            ThumbnailBackend::Progressive => "progressive",
        }
    }
}

impl fmt::Display for ThumbnailBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThumbnailBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scaled" | "thumbnail" => Ok(ThumbnailBackend::Scaled),
            "projection" => Ok(ThumbnailBackend::Projection),
            "progressive" => Ok(ThumbnailBackend::Progressive),
            other => Err(format!("unknown thumbnail backend: {other}")),
        }
    }
}

fn check_source(renderer: &dyn RegionRenderer) -> RenderResult<(u32, u32)> {
    let (width, height) = renderer.source_size();
    if width == 0 || height == 0 {
        return Err(RenderError::EmptySource { width, height });
    }
    Ok((width, height))
}

/// Render a `width` x `height` thumbnail in one blocking call
///
/// `backend` must not be [`ThumbnailBackend::Progressive`]; the progressive
/// path is driven step by step by the generator and is treated here as a
/// full projection render.
pub fn render_blocking(
    renderer: &dyn RegionRenderer,
    backend: ThumbnailBackend,
    width: u32,
    height: u32,
) -> RenderResult<RgbaImage> {
    let (source_width, source_height) = check_source(renderer)?;
    if width == 0 || height == 0 {
        return Err(RenderError::EmptySource { width, height });
    }

    renderer.wait_for_pending_work();
    let raster = match backend {
        ThumbnailBackend::Scaled => renderer.render_thumbnail(width, height)?,
        ThumbnailBackend::Projection | ThumbnailBackend::Progressive => {
            renderer.render_region(PixelRect::full(source_width, source_height))?
        }
    };
    Ok(resample(raster, width, height))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use image::Rgba;
    use std::cell::{Cell, RefCell};

    /// Solid-colour document that records the regions it was asked for
    pub struct SolidDocument {
        pub size: (u32, u32),
        pub color: Rgba<u8>,
        pub region_calls: RefCell<Vec<PixelRect>>,
        pub thumbnail_calls: Cell<u32>,
        pub fail: Cell<bool>,
        pub waits: Cell<u32>,
    }

    impl SolidDocument {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                size: (width, height),
                color: Rgba([10, 20, 30, 255]),
                region_calls: RefCell::new(Vec::new()),
                thumbnail_calls: Cell::new(0),
                fail: Cell::new(false),
                waits: Cell::new(0),
            }
        }
    }

    impl RegionRenderer for SolidDocument {
        fn source_size(&self) -> (u32, u32) {
            self.size
        }

        fn render_region(&self, region: PixelRect) -> RenderResult<RgbaImage> {
            if self.fail.get() {
                return Err(RenderError::Host("document closed".to_string()));
            }
            self.region_calls.borrow_mut().push(region);
            Ok(RgbaImage::from_pixel(region.width, region.height, self.color))
        }

        fn render_thumbnail(&self, width: u32, height: u32) -> RenderResult<RgbaImage> {
            self.thumbnail_calls.set(self.thumbnail_calls.get() + 1);
            Ok(RgbaImage::from_pixel(width, height, self.color))
        }

        fn wait_for_pending_work(&self) {
            self.waits.set(self.waits.get() + 1);
        }
    }
}
