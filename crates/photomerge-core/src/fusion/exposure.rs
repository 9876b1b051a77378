//! Mertens exposure fusion.
//!
//! Each frame gets a per-pixel weight from local contrast, colour
//! saturation and well-exposedness. The frames are blended with those
//! weights in Laplacian-pyramid space, which hides the seams a direct
//! per-pixel blend would show.

use ndarray::{Array2, Axis, Zip};
use rayon::prelude::*;
use tracing::debug;

use crate::align::warp::quantize;
use crate::color::luma_f32;
use crate::consts::{MERTENS_EXPOSURE_SIGMA, MERTENS_WEIGHT_EPSILON, PARALLEL_FRAME_THRESHOLD};
use crate::filters::gaussian_blur::Border;
use crate::filters::pyramid::{collapse_laplacian, gaussian_pyramid, laplacian_pyramid};
use crate::frame::{check_sequence, Frame};

/// Planes of one frame scaled to [0, 1].
fn unit_planes(frame: &Frame) -> Vec<Array2<f32>> {
    let max = frame.depth.max_value() as f32;
    (0..frame.channels())
        .map(|ch| frame.data.index_axis(Axis(2), ch).mapv(|v| v as f32 / max))
        .collect()
}

fn laplacian_magnitude(gray: &Array2<f32>) -> Array2<f32> {
    let (h, w) = gray.dim();
    let b = Border::Reflect101;
    Array2::from_shape_fn((h, w), |(r, c)| {
        let (ri, ci) = (r as isize, c as isize);
        let up = gray[[b.index(ri - 1, h), c]];
        let down = gray[[b.index(ri + 1, h), c]];
        let left = gray[[r, b.index(ci - 1, w)]];
        let right = gray[[r, b.index(ci + 1, w)]];
        (up + down + left + right - 4.0 * gray[[r, c]]).abs()
    })
}

/// Unnormalized Mertens weight map.
fn weight_map(frame: &Frame) -> Array2<f32> {
    let planes = unit_planes(frame);
    let max = frame.depth.max_value() as f32;
    let gray = luma_f32(frame).mapv(|v| v / max);
    let contrast = laplacian_magnitude(&gray);
    let two_sigma2 = 2.0 * MERTENS_EXPOSURE_SIGMA * MERTENS_EXPOSURE_SIGMA;
    let n = planes.len() as f32;

    let mut weight = contrast;
    Zip::indexed(&mut weight).for_each(|(r, c), w| {
        let mean = planes.iter().map(|p| p[[r, c]]).sum::<f32>() / n;
        let var = planes.iter().map(|p| (p[[r, c]] - mean).powi(2)).sum::<f32>() / n;
        let saturation = var.sqrt();
        let exposedness: f32 = planes
            .iter()
            .map(|p| (-(p[[r, c]] - 0.5).powi(2) / two_sigma2).exp())
            .product();
        *w = *w * saturation * exposedness + MERTENS_WEIGHT_EPSILON;
    });
    weight
}

/// Fuses differently exposed frames of the same scene. The result is
/// rescaled to the depth of the inputs.
pub fn exposure_fusion(frames: &[Frame]) -> Option<Frame> {
    check_sequence(frames).ok()?;
    let first = &frames[0];
    let (h, w, channels) = first.data.dim();
    let levels = (h.min(w) as f32).log2().floor().max(0.0) as usize;

    let weights: Vec<Array2<f32>> = if frames.len() >= PARALLEL_FRAME_THRESHOLD {
        frames.par_iter().map(weight_map).collect()
    } else {
        frames.iter().map(weight_map).collect()
    };
    let mut total = Array2::<f32>::zeros((h, w));
    for wm in &weights {
        total += wm;
    }

    let mut blended: Vec<Vec<Array2<f32>>> = Vec::with_capacity(channels);
    for (i, frame) in frames.iter().enumerate() {
        let normalized = &weights[i] / &total;
        let weight_pyr = gaussian_pyramid(&normalized, levels);
        for (ch, plane) in unit_planes(frame).iter().enumerate() {
            let lap = laplacian_pyramid(plane, levels);
            let contribution: Vec<Array2<f32>> = lap
                .iter()
                .zip(&weight_pyr)
                .map(|(band, wgt)| band * wgt)
                .collect();
            if blended.len() <= ch {
                blended.push(contribution);
            } else {
                for (acc, band) in blended[ch].iter_mut().zip(contribution) {
                    *acc += &band;
                }
            }
        }
    }

    let max = first.depth.max_value() as f32;
    let mut out = ndarray::Array3::<f32>::zeros((h, w, channels));
    for (ch, pyr) in blended.iter().enumerate() {
        let plane = collapse_laplacian(pyr);
        out.index_axis_mut(Axis(2), ch).assign(&(plane * max));
    }
    debug!(levels, frames = frames.len(), "Exposure fusion");
    Some(quantize(&out, first))
}
