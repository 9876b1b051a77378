#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array2, Array3};

use photomerge_core::color::{PixelLayout, RawFrame};
use photomerge_core::filters::gaussian_blur::gaussian_blur_array;
use photomerge_core::frame::{Frame, SampleDepth};
use photomerge_core::fusion::{FusionPrimitives, Projection, ReferencePrimitives};

/// Deterministic blocky grayscale scene in 0..=255.
///
/// Each `block x block` cell gets a pseudo-random intensity from a fixed
/// LCG, so block corners give plenty of trackable features.
pub fn textured_scene(width: usize, height: usize, block: usize, seed: u64, blur: f32) -> Array2<f32> {
    let cols = width.div_ceil(block);
    let rows = height.div_ceil(block);
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut cells = Vec::with_capacity(rows * cols);
    for _ in 0..rows * cols {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        cells.push(((state >> 33) % 256) as f32);
    }
    let scene = Array2::from_shape_fn((height, width), |(r, c)| cells[(r / block) * cols + c / block]);
    if blur > 0.0 {
        gaussian_blur_array(&scene, blur)
    } else {
        scene
    }
}

/// RGB frame cut from `scene` at (x0, y0). Channels are tinted copies of
/// the scene so colour channels differ.
pub fn crop_frame(scene: &Array2<f32>, x0: usize, y0: usize, width: usize, height: usize) -> Frame {
    let data = Array3::from_shape_fn((height, width, 3), |(r, c, ch)| {
        let v = scene[[y0 + r, x0 + c]];
        let tint = [1.0, 0.9, 0.75][ch];
        (v * tint).round().clamp(0.0, 255.0) as u16
    });
    Frame::new(data, SampleDepth::Eight).unwrap()
}

pub fn uniform_frame(width: usize, height: usize, value: u16) -> Frame {
    Frame::filled(width, height, value, SampleDepth::Eight)
}

/// Interleaved RGB raw buffer for a frame.
pub fn to_raw(frame: &Frame) -> RawFrame {
    RawFrame {
        width: frame.width(),
        height: frame.height(),
        layout: PixelLayout::Rgb,
        bits: frame.depth.bits(),
        samples: frame.data.iter().copied().collect(),
    }
}

/// Mean absolute sample difference over a window of rows and columns.
pub fn mean_abs_diff(
    a: &Frame,
    b: &Frame,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for r in rows {
        for c in cols.clone() {
            for ch in 0..a.channels() {
                sum += (a.data[[r, c, ch]] as f64 - b.data[[r, c, ch]] as f64).abs();
                n += 1;
            }
        }
    }
    sum / n.max(1) as f64
}

/// Reference primitives that count how often they are called.
#[derive(Default)]
pub struct CountingPrimitives {
    pub calls: AtomicUsize,
}

impl CountingPrimitives {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl FusionPrimitives for CountingPrimitives {
    fn stitch(&self, frames: &[Frame], projection: Projection) -> Option<Frame> {
        self.hit();
        ReferencePrimitives.stitch(frames, projection)
    }

    fn nearest_to_average(&self, frames: &[Frame], average: &Frame) -> Option<Frame> {
        self.hit();
        ReferencePrimitives.nearest_to_average(frames, average)
    }

    fn farthest_from_average(&self, frames: &[Frame], average: &Frame, threshold: u32) -> Option<Frame> {
        self.hit();
        ReferencePrimitives.farthest_from_average(frames, average, threshold)
    }

    fn light_or_dark(&self, frames: &[Frame], light: bool) -> Option<Frame> {
        self.hit();
        ReferencePrimitives.light_or_dark(frames, light)
    }
}
