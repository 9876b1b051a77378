use crate::frame::Frame;

use super::{panorama, select, Projection};

/// Numerical primitives the fusion engine delegates to.
///
/// The engine validates frame counts and geometry before calling in, so
/// implementations receive at least two same-geometry frames (three for
/// the selection primitives; panorama inputs may differ in size).
/// `None` means the primitive failed.
pub trait FusionPrimitives: Send + Sync {
    fn stitch(&self, frames: &[Frame], projection: Projection) -> Option<Frame>;

    fn nearest_to_average(&self, frames: &[Frame], average: &Frame) -> Option<Frame>;

    fn farthest_from_average(&self, frames: &[Frame], average: &Frame, threshold: u32)
        -> Option<Frame>;

    /// Per-channel maximum (`light = true`) or minimum across frames.
    fn light_or_dark(&self, frames: &[Frame], light: bool) -> Option<Frame>;
}

/// Pure-Rust implementation of every primitive.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferencePrimitives;

impl FusionPrimitives for ReferencePrimitives {
    fn stitch(&self, frames: &[Frame], projection: Projection) -> Option<Frame> {
        panorama::stitch(frames, projection)
    }

    fn nearest_to_average(&self, frames: &[Frame], average: &Frame) -> Option<Frame> {
        select::nearest_to_average(frames, average)
    }

    fn farthest_from_average(
        &self,
        frames: &[Frame],
        average: &Frame,
        threshold: u32,
    ) -> Option<Frame> {
        select::farthest_from_average(frames, average, threshold)
    }

    fn light_or_dark(&self, frames: &[Frame], light: bool) -> Option<Frame> {
        select::light_or_dark(frames, light)
    }
}
