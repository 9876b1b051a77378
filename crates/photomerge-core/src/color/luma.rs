use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R, PARALLEL_PIXEL_THRESHOLD};
use crate::frame::Frame;

/// BT.601 luminance in the frame's own sample scale.
pub fn luma_f32(frame: &Frame) -> Array2<f32> {
    let (h, w, c) = frame.data.dim();
    if c < 3 {
        return Array2::from_shape_fn((h, w), |(r, col)| frame.data[[r, col, 0]] as f32);
    }
    let px = |r: usize, col: usize| {
        LUMINANCE_R * frame.data[[r, col, 0]] as f32
            + LUMINANCE_G * frame.data[[r, col, 1]] as f32
            + LUMINANCE_B * frame.data[[r, col, 2]] as f32
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        let rows: Vec<Vec<f32>> = (0..h)
            .into_par_iter()
            .map(|r| (0..w).map(|col| px(r, col)).collect())
            .collect();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((h, w), flat).unwrap_or_else(|_| Array2::zeros((h, w)))
    } else {
        Array2::from_shape_fn((h, w), |(r, col)| px(r, col))
    }
}

/// Luminance contrast-stretched to the full 0..=255 range.
///
/// The result is kept as f32 so detectors can sample it sub-pixel; values
/// are integral. A constant image maps to all zeros.
pub fn normalized_gray(frame: &Frame) -> Array2<f32> {
    let luma = luma_f32(frame);
    let (min, max) = luma
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return Array2::zeros(luma.dim());
    }
    let scale = 255.0 / range;
    luma.mapv(|v| ((v - min) * scale).round())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SampleDepth;
    use ndarray::Array3;

    #[test]
    fn test_normalized_gray_stretches_range() {
        let mut data = Array3::<u16>::from_elem((2, 2, 3), 100);
        data[[1, 1, 0]] = 110;
        data[[1, 1, 1]] = 110;
        data[[1, 1, 2]] = 110;
        let frame = Frame::new(data, SampleDepth::Eight).unwrap();
        let g = normalized_gray(&frame);
        assert_eq!(g[[0, 0]], 0.0);
        assert_eq!(g[[1, 1]], 255.0);
    }

    #[test]
    fn test_constant_frame_gives_zeros() {
        let frame = Frame::filled(3, 3, 4000, SampleDepth::Sixteen);
        assert!(normalized_gray(&frame).iter().all(|&v| v == 0.0));
    }
}
