use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb};
use ndarray::{Array2, Array3};
use tracing::debug;

use crate::frame::{Frame, Mask};

/// Size of the preview copy of a `width x height` frame, or `None` when
/// the frame already fits inside `max_dim`.
///
/// The longer side becomes `max_dim`; the shorter side keeps the aspect
/// ratio (rounded down, at least 1).
pub fn preview_size(width: usize, height: usize, max_dim: usize) -> Option<(usize, usize)> {
    if max_dim == 0 || (width <= max_dim && height <= max_dim) {
        return None;
    }
    let size = if height < width {
        (max_dim, (max_dim * height / width).max(1))
    } else {
        ((max_dim * width / height).max(1), max_dim)
    };
    Some(size)
}

/// Lanczos resize of an RGB frame. Samples are clamped to the frame depth.
pub fn resize_frame(frame: &Frame, width: usize, height: usize) -> Frame {
    let (h, w, c) = frame.data.dim();
    if (w, h) == (width, height) {
        return frame.clone();
    }

    let raw: Vec<u16> = frame.data.iter().copied().collect();
    let resized = match ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w as u32, h as u32, raw) {
        Some(buf) if c == 3 => {
            imageops::resize(&buf, width as u32, height as u32, FilterType::Lanczos3).into_raw()
        }
        _ => {
            // Not a 3-channel buffer; resample each plane on its own.
            return resize_planes(frame, width, height);
        }
    };

    let max = frame.depth.max_value();
    let data = Array3::from_shape_vec((height, width, 3), resized)
        .map(|a| a.mapv(|v| v.min(max)))
        .unwrap_or_else(|_| Array3::zeros((height, width, 3)));
    Frame {
        data,
        depth: frame.depth,
    }
}

fn resize_planes(frame: &Frame, width: usize, height: usize) -> Frame {
    let (_, _, c) = frame.data.dim();
    let max = frame.depth.max_value() as f32;
    let planes: Vec<Array2<f32>> = (0..c)
        .map(|ch| {
            let plane = frame
                .data
                .index_axis(ndarray::Axis(2), ch)
                .mapv(|v| v as f32);
            resize_array(&plane, height, width)
        })
        .collect();
    let data = Array3::from_shape_fn((height, width, c), |(r, col, ch)| {
        planes[ch][[r, col]].round().clamp(0.0, max) as u16
    });
    Frame {
        data,
        depth: frame.depth,
    }
}

/// Nearest-neighbour resize of a mask, so it stays binary.
pub fn resize_mask(mask: &Mask, width: usize, height: usize) -> Mask {
    if (mask.width(), mask.height()) == (width, height) {
        return mask.clone();
    }
    let raw: Vec<u8> = mask.data.iter().copied().collect();
    let Some(buf) =
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(mask.width() as u32, mask.height() as u32, raw)
    else {
        return Mask::full(width, height);
    };
    let resized = imageops::resize(&buf, width as u32, height as u32, FilterType::Nearest);
    let data = Array2::from_shape_vec((height, width), resized.into_raw())
        .unwrap_or_else(|_| Array2::from_elem((height, width), Mask::INCLUDED));
    Mask::new(data)
}

/// Resize of a non-negative single-channel float image with a triangle
/// filter, which widens to average the source when shrinking.
pub fn resize_array(data: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (h, w) = data.dim();
    if (h, w) == (height, width) {
        return data.clone();
    }
    debug!(from_w = w, from_h = h, to_w = width, to_h = height, "Resize");
    // Float buffers are clamped to 0..1 by the resampler.
    let peak = data.fold(0.0f32, |m, &v| m.max(v)).max(f32::EPSILON);
    let raw: Vec<f32> = data.iter().map(|&v| v / peak).collect();
    let Some(buf) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w as u32, h as u32, raw) else {
        return Array2::zeros((height, width));
    };
    let resized = imageops::resize(&buf, width as u32, height as u32, FilterType::Triangle);
    Array2::from_shape_vec((height, width), resized.into_raw())
        .map(|a| a.mapv(|v| v * peak))
        .unwrap_or_else(|_| Array2::zeros((height, width)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SampleDepth;

    #[test]
    fn test_preview_size_landscape_and_portrait() {
        assert_eq!(preview_size(4000, 3000, 1024), Some((1024, 768)));
        assert_eq!(preview_size(3000, 4000, 1024), Some((768, 1024)));
        assert_eq!(preview_size(2048, 2048, 1024), Some((1024, 1024)));
    }

    #[test]
    fn test_preview_size_small_frame_unchanged() {
        assert_eq!(preview_size(800, 600, 1024), None);
        assert_eq!(preview_size(1024, 1024, 1024), None);
    }

    #[test]
    fn test_resize_frame_constant_and_clamped() {
        let frame = Frame::filled(40, 20, 255, SampleDepth::Eight);
        let small = resize_frame(&frame, 10, 5);
        assert_eq!(small.width(), 10);
        assert_eq!(small.height(), 5);
        assert!(small.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_resize_array_averages_fine_detail() {
        // One-pixel stripes shrink to their mean instead of aliasing.
        let stripes =
            Array2::from_shape_fn((64, 64), |(_, c)| if c % 2 == 0 { 0.0 } else { 200.0 });
        let small = resize_array(&stripes, 16, 16);
        assert_eq!(small.dim(), (16, 16));
        for &v in small.slice(ndarray::s![2..14, 2..14]).iter() {
            assert!((v - 100.0).abs() < 10.0, "value {} should be near the mean", v);
        }
    }

    #[test]
    fn test_resize_mask_stays_binary() {
        let mut mask = Mask::full(8, 8);
        for r in 0..8 {
            for c in 0..4 {
                mask.data[[r, c]] = Mask::EXCLUDED;
            }
        }
        let small = resize_mask(&mask, 4, 4);
        assert!(small
            .data
            .iter()
            .all(|&v| v == Mask::EXCLUDED || v == Mask::INCLUDED));
        assert!(!small.includes(0, 0));
        assert!(small.includes(0, 3));
    }
}
