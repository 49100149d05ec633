//! Frame perception: geometry primitives, blob classification against the
//! template registry, and the annotation primitives used to draw what the
//! bot sees back onto the frame.

mod annotate;
mod classify;
mod geometry;

use image::RgbaImage;
use thiserror::Error;

pub use annotate::{annotate_entities, draw_cross, draw_rect, hline, vline, NEUTRAL_GRAY};
pub use classify::{classify, sample_center, Entity};
pub use geometry::{Blob, Point, Rect};

#[derive(Debug, Error)]
pub enum VisionError {
    /// A sample point fell outside the frame. The geometry that produces
    /// sample points is derived from the same frame, so this indicates a
    /// bug in the caller rather than a runtime condition.
    #[error("sample point ({x}, {y}) outside {width}x{height} frame")]
    SampleOutOfRange {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// The external segmentation backend: thresholds a frame and extracts blob
/// contours. Implementations live outside this crate.
pub trait Segmenter {
    fn segment(&mut self, frame: &RgbaImage) -> Vec<Blob>;
}
