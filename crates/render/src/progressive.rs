//! Progressive thumbnail generation
//!
//! Rendering the full-resolution projection of a large document in one call
//! would stall the host's event loop. The generator instead renders one block
//! of the source per step, scales it into the matching region of the output
//! raster, and hands control back to the scheduler between blocks.
//!
//! ```text
//! Idle --start()--> Stepping --step()...--> Done
//!                      |
//!                   stop() / render error
//!                      v
//!                   Stopped
//! ```

use crate::raster::{blank_raster, composite_block, PixelRect};
use crate::source::{RegionRenderer, RenderError, RenderResult};
use docpanel_scheduler::CancellationToken;
use image::RgbaImage;

/// Default edge length of a source block in pixels
pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Blocks are never skewed below this edge length
pub const MIN_BLOCK_EDGE: u32 = 32;

/// A document this many times more elongated than the block gets a skewed block
const SKEW_RATIO: u64 = 4;

/// Called once with the finished raster
pub type FinishedCallback = Box<dyn FnOnce(&RgbaImage)>;

/// Generator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Created but not started
    Idle,

    /// Rendering blocks
    Stepping,

    /// Every block rendered; the output is complete
    Done,

    /// Stopped before completion; there is no result
    Stopped,
}

impl GeneratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GeneratorState::Done | GeneratorState::Stopped)
    }
}

/// Choose a block shape for a `source` sized document
///
/// Starts from a `base` x `base` square. For strongly elongated documents the
/// block is halved on the short axis and doubled on the long one, keeping the
/// per-step pixel count constant, until it roughly follows the document's
/// shape. The result is clamped to the source.
pub fn block_size_for(source: (u32, u32), base: u32) -> (u32, u32) {
    let (source_width, source_height) = (source.0 as u64, source.1 as u64);
    let base = base.max(MIN_BLOCK_EDGE);
    let (mut block_width, mut block_height) = (base as u64, base as u64);

    while source_width * block_height > SKEW_RATIO * source_height * block_width
        && block_height / 2 >= MIN_BLOCK_EDGE as u64
    {
        block_width *= 2;
        block_height /= 2;
    }
    while source_height * block_width > SKEW_RATIO * source_width * block_height
        && block_width / 2 >= MIN_BLOCK_EDGE as u64
    {
        block_height *= 2;
        block_width /= 2;
    }

    (
        block_width.min(source_width).max(1) as u32,
        block_height.min(source_height).max(1) as u32,
    )
}

/// Renders one thumbnail block by block
///
/// # Example
///
/// ```
/// use docpanel_render::{GeneratorState, PixelRect, ProgressiveThumbnailGenerator};
/// use docpanel_render::{RegionRenderer, RenderResult};
/// use image::{Rgba, RgbaImage};
///
/// struct White;
///
/// impl RegionRenderer for White {
///     fn source_size(&self) -> (u32, u32) {
///         (1024, 1024)
///     }
///     fn render_region(&self, region: PixelRect) -> RenderResult<RgbaImage> {
///         Ok(RgbaImage::from_pixel(region.width, region.height, Rgba([255; 4])))
///     }
///     fn render_thumbnail(&self, w: u32, h: u32) -> RenderResult<RgbaImage> {
///         Ok(RgbaImage::from_pixel(w, h, Rgba([255; 4])))
///     }
/// }
///
/// let mut generator = ProgressiveThumbnailGenerator::new((1024, 1024), (64, 64), 512);
/// generator.start().unwrap();
/// while generator.step(&White).unwrap() == GeneratorState::Stepping {}
///
/// assert_eq!(generator.progress(), 1.0);
/// assert_eq!(generator.take_output().unwrap().dimensions(), (64, 64));
/// ```
pub struct ProgressiveThumbnailGenerator {
    state: GeneratorState,
    source_size: (u32, u32),
    target_size: (u32, u32),
    block_size: (u32, u32),
    cursor: (u32, u32),
    processed_pixels: u64,
    steps: u32,
    output: Option<RgbaImage>,
    on_finished: Option<FinishedCallback>,
    stop_token: CancellationToken,
}

impl ProgressiveThumbnailGenerator {
    /// Create a generator rendering a `source_size` document into `target_size`
    pub fn new(source_size: (u32, u32), target_size: (u32, u32), base_block: u32) -> Self {
        Self {
            state: GeneratorState::Idle,
            source_size,
            target_size,
            block_size: block_size_for(source_size, base_block),
            cursor: (0, 0),
            processed_pixels: 0,
            steps: 0,
            output: None,
            on_finished: None,
            stop_token: CancellationToken::new(),
        }
    }

    /// Register the callback that receives the completed raster
    pub fn with_finished(mut self, callback: FinishedCallback) -> Self {
        self.on_finished = Some(callback);
        self
    }

    /// Allocate the blank output raster and enter the stepping state
    pub fn start(&mut self) -> RenderResult<()> {
        let (source_width, source_height) = self.source_size;
        if source_width == 0 || source_height == 0 {
            return Err(RenderError::EmptySource { width: source_width, height: source_height });
        }
        let (target_width, target_height) = self.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(RenderError::EmptySource { width: target_width, height: target_height });
        }
        if self.state != GeneratorState::Idle {
            return Ok(());
        }

        self.output = Some(blank_raster(target_width, target_height));
        self.state = GeneratorState::Stepping;
        log::debug!(
            "progressive thumbnail {}x{} -> {}x{} in {}x{} blocks",
            source_width,
            source_height,
            target_width,
            target_height,
            self.block_size.0,
            self.block_size.1
        );
        Ok(())
    }

    /// Render the block under the cursor and advance
    ///
    /// The first step lets the host finish pending work before any block is
    /// rendered. Returns the state after the step. A render error stops the
    /// generator; it produces no result after that.
    pub fn step(&mut self, renderer: &dyn RegionRenderer) -> RenderResult<GeneratorState> {
        if self.stop_token.is_cancelled() && self.state != GeneratorState::Stopped {
            self.halt();
        }
        if self.state != GeneratorState::Stepping {
            return Ok(self.state);
        }

        if self.steps == 0 {
            renderer.wait_for_pending_work();
        }

        let block = self.current_block();
        let target = block.scale_between(self.source_size, self.target_size);
        if !target.is_empty() {
            let rendered = match renderer.render_region(block) {
                Ok(rendered) => rendered,
                Err(err) => {
                    self.halt();
                    return Err(err);
                }
            };
            if let Some(output) = self.output.as_mut() {
                composite_block(output, rendered, target);
            }
        }

        self.processed_pixels += block.area();
        self.steps += 1;
        self.advance_cursor();

        if self.cursor.1 >= self.source_size.1 {
            self.state = GeneratorState::Done;
            if let (Some(callback), Some(output)) = (self.on_finished.take(), self.output.as_ref()) {
                callback(output);
            }
            log::debug!("progressive thumbnail finished after {} steps", self.steps);
        }
        Ok(self.state)
    }

    /// Cancel generation; the finished callback will never run
    pub fn stop(&mut self) {
        self.stop_token.cancel();
        self.halt();
    }

    /// Token that stops this generator at its next step when cancelled
    pub fn stop_token(&self) -> CancellationToken {
        self.stop_token.clone()
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Fraction of source pixels processed so far (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        let total = self.source_size.0 as u64 * self.source_size.1 as u64;
        if total == 0 {
            return 0.0;
        }
        (self.processed_pixels as f64 / total as f64).min(1.0)
    }

    pub fn block_size(&self) -> (u32, u32) {
        self.block_size
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    /// Number of steps taken so far
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Total number of steps a full run takes
    pub fn total_steps(&self) -> u32 {
        let columns = self.source_size.0.div_ceil(self.block_size.0);
        let rows = self.source_size.1.div_ceil(self.block_size.1);
        columns * rows
    }

    /// Output composited so far, while the generator is stepping
    ///
    /// Blocks not rendered yet are still blank.
    pub fn partial_output(&self) -> Option<&RgbaImage> {
        if self.state == GeneratorState::Stepping {
            self.output.as_ref()
        } else {
            None
        }
    }

    /// Take the finished raster
    ///
    /// Returns `None` unless the generator is done.
    pub fn take_output(&mut self) -> Option<RgbaImage> {
        if self.state == GeneratorState::Done {
            self.output.take()
        } else {
            None
        }
    }

    fn current_block(&self) -> PixelRect {
        let (x, y) = self.cursor;
        let width = self.block_size.0.min(self.source_size.0 - x);
        let height = self.block_size.1.min(self.source_size.1 - y);
        PixelRect::new(x, y, width, height)
    }

    fn advance_cursor(&mut self) {
        self.cursor.0 += self.block_size.0;
        if self.cursor.0 >= self.source_size.0 {
            self.cursor.0 = 0;
            self.cursor.1 += self.block_size.1;
        }
    }

    fn halt(&mut self) {
        if !self.state.is_terminal() {
            log::debug!("progressive thumbnail stopped at {:.0}%", self.progress() * 100.0);
        }
        if self.state != GeneratorState::Done {
            self.state = GeneratorState::Stopped;
            self.output = None;
            self.on_finished = None;
        }
    }
}

impl std::fmt::Debug for ProgressiveThumbnailGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveThumbnailGenerator")
            .field("state", &self.state)
            .field("source_size", &self.source_size)
            .field("target_size", &self.target_size)
            .field("block_size", &self.block_size)
            .field("cursor", &self.cursor)
            .finish()
    }
}
