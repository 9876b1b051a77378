//! Feature-based panorama stitcher.
//!
//! Consecutive frames are registered pairwise with the feature strategy,
//! the homographies are chained into the geometry of frame 0, and all
//! frames are warped onto one canvas and feathered together.

use nalgebra::Matrix3;
use ndarray::{Array2, Array3};
use tracing::{debug, info, warn};

use crate::align::prepare_reference;
use crate::align::warp::{project, quantize, remap};
use crate::consts::MAX_PANORAMA_AREA_FACTOR;
use crate::frame::Frame;
use crate::pipeline::config::AlignmentConfig;

use super::Projection;

/// Frame resampled onto the projection surface, with its valid area.
struct Projected {
    frame: Frame,
    valid: Array2<f32>,
}

fn surface_to_image(projection: Projection, f: f64, cx: f64, cy: f64, x: f64, y: f64) -> Option<(f64, f64)> {
    let theta = (x - cx) / f;
    let v = (y - cy) / f;
    match projection {
        Projection::Plane => Some((x, y)),
        Projection::Cylindrical => {
            let cos = theta.cos();
            if cos <= 1e-6 {
                return None;
            }
            Some((f * theta.tan() + cx, f * v / cos + cy))
        }
        Projection::Spherical => {
            let (dx, dy, dz) = (theta.sin() * v.cos(), v.sin(), theta.cos() * v.cos());
            if dz <= 1e-6 {
                return None;
            }
            Some((f * dx / dz + cx, f * dy / dz + cy))
        }
    }
}

fn project_surface(frame: &Frame, projection: Projection) -> Projected {
    let (w, h) = (frame.width(), frame.height());
    if projection == Projection::Plane {
        return Projected {
            frame: frame.clone(),
            valid: Array2::ones((h, w)),
        };
    }
    let f = w.max(h) as f64;
    let (cx, cy) = ((w as f64 - 1.0) / 2.0, (h as f64 - 1.0) / 2.0);
    let warped = remap(frame, w, h, |x, y| surface_to_image(projection, f, cx, cy, x, y));
    Projected {
        frame: quantize(&warped.data, frame),
        valid: warped.weight.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
    }
}

fn translation(tx: f64, ty: f64) -> Matrix3<f64> {
    Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0)
}

/// Stitches an ordered sequence of overlapping frames. `None` when a pair
/// of neighbours cannot be registered or the canvas degenerates.
pub fn stitch(frames: &[Frame], projection: Projection) -> Option<Frame> {
    let first = frames.first()?;
    if frames.iter().any(|f| f.depth != first.depth || f.channels() != first.channels()) {
        warn!("Panorama frames differ in depth or channel count");
        return None;
    }

    let projected: Vec<Projected> = frames.iter().map(|f| project_surface(f, projection)).collect();

    // Chain frame i -> frame i-1 transforms into frame i -> frame 0.
    let config = AlignmentConfig::default();
    let mut to_first = vec![Matrix3::<f64>::identity()];
    for i in 1..projected.len() {
        let pair = prepare_reference(&projected[i - 1].frame, None, &config)
            .and_then(|r| r.transform_for(&projected[i].frame));
        match pair {
            Ok(h) => {
                let chained = to_first[i - 1] * h;
                to_first.push(chained);
            }
            Err(e) => {
                warn!(frame = i, error = %e, "Cannot register panorama neighbours");
                return None;
            }
        }
    }

    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for (p, t) in projected.iter().zip(&to_first) {
        let (w, h) = (p.frame.width() as f64 - 1.0, p.frame.height() as f64 - 1.0);
        for (x, y) in [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)] {
            let (px, py) = project(t, x, y)?;
            min_x = min_x.min(px);
            min_y = min_y.min(py);
            max_x = max_x.max(px);
            max_y = max_y.max(py);
        }
    }
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return None;
    }
    let (min_x, min_y) = (min_x.floor(), min_y.floor());
    let width = (max_x - min_x).floor() as usize + 1;
    let height = (max_y - min_y).floor() as usize + 1;
    let limit = first.width() * first.height() * MAX_PANORAMA_AREA_FACTOR;
    if width.saturating_mul(height) > limit {
        warn!(width, height, "Panorama canvas too large, transforms are degenerate");
        return None;
    }
    debug!(width, height, "Panorama canvas");

    let offset = translation(-min_x, -min_y);
    let channels = first.channels();
    let mut sum = Array3::<f32>::zeros((height, width, channels));
    let mut total = Array2::<f32>::zeros((height, width));

    for (p, t) in projected.iter().zip(&to_first) {
        let inverse = (offset * t).try_inverse()?;
        let warped = remap(&p.frame, width, height, |x, y| project(&inverse, x, y));
        let (vh, vw) = p.valid.dim();
        for r in 0..height {
            for c in 0..width {
                let mut wgt = warped.weight[[r, c]];
                if wgt <= 0.0 {
                    continue;
                }
                if let Some((sx, sy)) = project(&inverse, c as f64, r as f64) {
                    let (vx, vy) = (sx.round(), sy.round());
                    if vx < 0.0 || vy < 0.0 || vx as usize >= vw || vy as usize >= vh {
                        continue;
                    }
                    wgt *= p.valid[[vy as usize, vx as usize]];
                }
                if wgt <= 0.0 {
                    continue;
                }
                total[[r, c]] += wgt;
                for ch in 0..channels {
                    sum[[r, c, ch]] += warped.data[[r, c, ch]] * wgt;
                }
            }
        }
    }

    for r in 0..height {
        for c in 0..width {
            let t = total[[r, c]];
            if t > 0.0 {
                for ch in 0..channels {
                    sum[[r, c, ch]] /= t;
                }
            }
        }
    }

    if total.iter().all(|&t| t <= 0.0) {
        return None;
    }
    info!(frames = frames.len(), width, height, projection = projection.name(), "Panorama stitched");
    Some(quantize(&sum, first))
}
