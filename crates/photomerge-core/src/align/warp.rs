//! Inverse-mapped resampling with a Lanczos-4 kernel.

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3};
use rayon::prelude::*;

use crate::consts::{LANCZOS_A, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{MergeError, Result};
use crate::frame::Frame;

/// Resampled float image plus a per-pixel feather weight.
///
/// `weight` is the distance (in source pixels) from the sampled position to
/// the nearest source border, and 0 where the destination pixel does not
/// map inside the source.
pub struct Warped {
    pub data: Array3<f32>,
    pub weight: Array2<f32>,
}

impl Warped {
    pub fn covered(&self) -> usize {
        self.weight.iter().filter(|&&w| w > 0.0).count()
    }
}

/// Fills a `width x height` destination by looking up each pixel's source
/// position through `map`. Samples outside the source read as 0.
pub fn remap<F>(frame: &Frame, width: usize, height: usize, map: F) -> Warped
where
    F: Fn(f64, f64) -> Option<(f64, f64)> + Sync,
{
    let channels = frame.channels();
    let (sh, sw) = (frame.height() as f64, frame.width() as f64);

    let row_fn = |row: usize| -> (Vec<f32>, Vec<f32>) {
        let mut values = vec![0.0f32; width * channels];
        let mut weights = vec![0.0f32; width];
        for col in 0..width {
            let Some((sx, sy)) = map(col as f64, row as f64) else {
                continue;
            };
            if !(sx > -1.0 && sy > -1.0 && sx < sw && sy < sh) {
                continue;
            }
            let feather = (sx + 1.0).min(sw - sx).min(sy + 1.0).min(sh - sy);
            weights[col] = feather as f32;
            for ch in 0..channels {
                values[col * channels + ch] = lanczos_sample(&frame.data, sy, sx, ch);
            }
        }
        (values, weights)
    };

    let rows: Vec<(Vec<f32>, Vec<f32>)> = if width * height >= PARALLEL_PIXEL_THRESHOLD {
        (0..height).into_par_iter().map(row_fn).collect()
    } else {
        (0..height).map(row_fn).collect()
    };

    let mut data = Array3::<f32>::zeros((height, width, channels));
    let mut weight = Array2::<f32>::zeros((height, width));
    for (row, (values, weights)) in rows.into_iter().enumerate() {
        for col in 0..width {
            weight[[row, col]] = weights[col];
            for ch in 0..channels {
                data[[row, col, ch]] = values[col * channels + ch];
            }
        }
    }
    Warped { data, weight }
}

/// Applies a projective transform (source → destination) to a frame, with
/// a destination of `width x height`.
///
/// Fails if the transform cannot be inverted or no destination pixel maps
/// inside the source.
pub fn warp_perspective(
    frame: &Frame,
    transform: &Matrix3<f64>,
    width: usize,
    height: usize,
) -> Result<Frame> {
    let inverse = transform
        .try_inverse()
        .ok_or_else(|| MergeError::DegenerateTransform("singular matrix".into()))?;
    let warped = remap(frame, width, height, |x, y| project(&inverse, x, y));
    if warped.covered() == 0 {
        return Err(MergeError::EmptyWarp);
    }
    Ok(quantize(&warped.data, frame))
}

/// Applies a homogeneous 3x3 transform to a point.
#[inline]
pub fn project(m: &Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
    let p = m * Vector3::new(x, y, 1.0);
    if p.z.abs() < 1e-12 {
        return None;
    }
    Some((p.x / p.z, p.y / p.z))
}

/// Rounds float samples back to the depth of `like`.
pub fn quantize(data: &Array3<f32>, like: &Frame) -> Frame {
    let max = like.depth.max_value() as f32;
    Frame {
        data: data.mapv(|v| v.round().clamp(0.0, max) as u16),
        depth: like.depth,
    }
}

#[inline]
fn lanczos_weight(d: f64) -> f64 {
    let a = LANCZOS_A as f64;
    if d.abs() < 1e-12 {
        return 1.0;
    }
    if d.abs() >= a {
        return 0.0;
    }
    let pd = std::f64::consts::PI * d;
    a * pd.sin() * (pd / a).sin() / (pd * pd)
}

/// Lanczos-4 interpolation of one channel at (y, x). Positions within
/// 1e-6 of a pixel centre copy that pixel exactly.
pub fn lanczos_sample(data: &Array3<u16>, y: f64, x: f64, ch: usize) -> f32 {
    let (h, w, _) = data.dim();
    let at = |r: i64, c: i64| -> f64 {
        if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
            data[[r as usize, c as usize, ch]] as f64
        } else {
            0.0
        }
    };

    let (rx, ry) = (x.round(), y.round());
    if (x - rx).abs() < 1e-6 && (y - ry).abs() < 1e-6 {
        return at(ry as i64, rx as i64) as f32;
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let mut wx = [0.0f64; 2 * LANCZOS_A as usize];
    let mut wy = [0.0f64; 2 * LANCZOS_A as usize];
    for i in 0..wx.len() {
        let tap = i as i64 - LANCZOS_A + 1;
        wx[i] = lanczos_weight(x - (x0 + tap) as f64);
        wy[i] = lanczos_weight(y - (y0 + tap) as f64);
    }

    let mut sum = 0.0f64;
    let mut norm = 0.0f64;
    for (j, &wyj) in wy.iter().enumerate() {
        let r = y0 + j as i64 - LANCZOS_A + 1;
        for (i, &wxi) in wx.iter().enumerate() {
            let c = x0 + i as i64 - LANCZOS_A + 1;
            let wgt = wyj * wxi;
            sum += wgt * at(r, c);
            norm += wgt;
        }
    }
    if norm.abs() < 1e-12 {
        return 0.0;
    }
    (sum / norm) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SampleDepth;

    fn gradient_frame() -> Frame {
        let data = Array3::from_shape_fn((20, 30, 3), |(r, c, ch)| (r * 5 + c * 3 + ch) as u16);
        Frame::new(data, SampleDepth::Eight).unwrap()
    }

    #[test]
    fn test_identity_warp_is_exact() {
        let f = gradient_frame();
        let out = warp_perspective(&f, &Matrix3::identity(), 30, 20).unwrap();
        assert_eq!(out, f);
    }

    #[test]
    fn test_integer_translation() {
        let f = gradient_frame();
        let mut t = Matrix3::identity();
        t[(0, 2)] = 2.0;
        let out = warp_perspective(&f, &t, 30, 20).unwrap();
        assert_eq!(out.data[[5, 10, 0]], f.data[[5, 8, 0]]);
        assert_eq!(out.data[[5, 0, 1]], 0);
    }

    #[test]
    fn test_warp_outside_is_empty() {
        let f = gradient_frame();
        let mut t = Matrix3::identity();
        t[(0, 2)] = 1000.0;
        assert!(matches!(
            warp_perspective(&f, &t, 30, 20),
            Err(MergeError::EmptyWarp)
        ));
    }

    #[test]
    fn test_singular_transform_rejected() {
        let f = gradient_frame();
        let t = Matrix3::zeros();
        assert!(warp_perspective(&f, &t, 30, 20).is_err());
    }

    #[test]
    fn test_lanczos_half_pixel_between_equal_values() {
        let data = Array3::from_elem((10, 10, 1), 100u16);
        let v = lanczos_sample(&data, 4.5, 4.5, 0);
        assert!((v - 100.0).abs() < 1e-3, "v={} should be ~100", v);
    }
}
