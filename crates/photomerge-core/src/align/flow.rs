//! Sparse optical flow: Shi-Tomasi corners tracked with pyramidal
//! Lucas-Kanade.

use nalgebra::{Matrix2, Point2, Vector2};
use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::LK_MIN_EIGEN_THRESHOLD;
use crate::filters::gaussian_blur::Border;
use crate::filters::pyramid::gaussian_pyramid;
use crate::filters::sample::bilinear_sample_clamped;
use crate::frame::Mask;
use crate::pipeline::config::FlowConfig;

use super::orb::sobel;

/// Strongest Shi-Tomasi corners, at least `min_distance` apart, best first.
pub fn good_features_to_track(
    gray: &Array2<f32>,
    max_corners: usize,
    quality_level: f64,
    min_distance: f64,
    mask: Option<&Mask>,
) -> Vec<Point2<f32>> {
    let (h, w) = gray.dim();
    if h < 5 || w < 5 || max_corners == 0 {
        return Vec::new();
    }

    let mut gxx = Array2::<f32>::zeros((h, w));
    let mut gyy = Array2::<f32>::zeros((h, w));
    let mut gxy = Array2::<f32>::zeros((h, w));
    for r in 1..h - 1 {
        for c in 1..w - 1 {
            let (gx, gy) = sobel(gray, r, c);
            gxx[[r, c]] = gx * gx;
            gyy[[r, c]] = gy * gy;
            gxy[[r, c]] = gx * gy;
        }
    }

    let mut eig = Array2::<f32>::zeros((h, w));
    for r in 2..h - 2 {
        for c in 2..w - 2 {
            let (mut a, mut b, mut d) = (0.0f32, 0.0f32, 0.0f32);
            for y in r - 1..=r + 1 {
                for x in c - 1..=c + 1 {
                    a += gxx[[y, x]];
                    b += gxy[[y, x]];
                    d += gyy[[y, x]];
                }
            }
            let half_trace = (a + d) * 0.5;
            let diff = (a - d) * 0.5;
            eig[[r, c]] = half_trace - (diff * diff + b * b).sqrt();
        }
    }

    let max = eig.iter().cloned().fold(0.0f32, f32::max);
    if max <= 0.0 {
        return Vec::new();
    }
    let threshold = max * quality_level as f32;

    let mut candidates: Vec<(usize, usize, f32)> = Vec::new();
    for r in 2..h - 2 {
        for c in 2..w - 2 {
            let v = eig[[r, c]];
            if v <= threshold || mask.is_some_and(|m| !m.includes(r, c)) {
                continue;
            }
            let mut is_max = true;
            'nbh: for y in r - 1..=r + 1 {
                for x in c - 1..=c + 1 {
                    if eig[[y, x]] > v {
                        is_max = false;
                        break 'nbh;
                    }
                }
            }
            if is_max {
                candidates.push((r, c, v));
            }
        }
    }
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

    let min_d2 = (min_distance * min_distance) as f32;
    let mut corners: Vec<Point2<f32>> = Vec::with_capacity(max_corners);
    for (r, c, _) in candidates {
        let p = Point2::new(c as f32, r as f32);
        if corners.iter().all(|q| (p - *q).norm_squared() >= min_d2) {
            corners.push(p);
            if corners.len() >= max_corners {
                break;
            }
        }
    }
    corners
}

struct FlowLevel {
    image: Array2<f32>,
    grad_x: Array2<f32>,
    grad_y: Array2<f32>,
}

fn central_gradients(image: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (h, w) = image.dim();
    let b = Border::Replicate;
    let gx = Array2::from_shape_fn((h, w), |(r, c)| {
        (image[[r, b.index(c as isize + 1, w)]] - image[[r, b.index(c as isize - 1, w)]]) * 0.5
    });
    let gy = Array2::from_shape_fn((h, w), |(r, c)| {
        (image[[b.index(r as isize + 1, h), c]] - image[[b.index(r as isize - 1, h), c]]) * 0.5
    });
    (gx, gy)
}

/// Pyramidal Lucas-Kanade tracker.
pub struct LucasKanade {
    window_size: usize,
    pyramid_levels: usize,
    max_iterations: usize,
    epsilon: f32,
}

impl LucasKanade {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            window_size: config.window_size.max(3) | 1,
            pyramid_levels: config.pyramid_levels,
            max_iterations: config.max_iterations.max(1),
            epsilon: config.epsilon,
        }
    }

    /// Tracks `points` from `prev` into `next`. Lost points are `None`.
    pub fn track(
        &self,
        prev: &Array2<f32>,
        next: &Array2<f32>,
        points: &[Point2<f32>],
    ) -> Vec<Option<Point2<f32>>> {
        let (h, w) = prev.dim();
        if next.dim() != (h, w) {
            return vec![None; points.len()];
        }

        // Stop before a level gets smaller than the window.
        let mut levels = 0;
        while levels < self.pyramid_levels
            && (h >> (levels + 1)) >= self.window_size
            && (w >> (levels + 1)) >= self.window_size
        {
            levels += 1;
        }

        let prev_pyr: Vec<FlowLevel> = gaussian_pyramid(prev, levels)
            .into_iter()
            .map(|image| {
                let (grad_x, grad_y) = central_gradients(&image);
                FlowLevel {
                    image,
                    grad_x,
                    grad_y,
                }
            })
            .collect();
        let next_pyr = gaussian_pyramid(next, levels);

        points
            .par_iter()
            .map(|p| {
                self.track_point(&prev_pyr, &next_pyr, *p)
                    .filter(|q| q.x >= 0.0 && q.y >= 0.0 && q.x < w as f32 && q.y < h as f32)
            })
            .collect()
    }

    fn track_point(
        &self,
        prev_pyr: &[FlowLevel],
        next_pyr: &[Array2<f32>],
        point: Point2<f32>,
    ) -> Option<Point2<f32>> {
        let half = (self.window_size / 2) as i32;
        let area = (self.window_size * self.window_size) as f32;
        let mut guess = Vector2::<f32>::zeros();

        for level in (0..prev_pyr.len()).rev() {
            let scale = (1u32 << level) as f32;
            let p = point.coords / scale;
            let lvl = &prev_pyr[level];
            let next = &next_pyr[level];

            let mut template = Vec::with_capacity(self.window_size * self.window_size);
            let mut g = Matrix2::<f32>::zeros();
            for dy in -half..=half {
                for dx in -half..=half {
                    let y = (p.y + dy as f32) as f64;
                    let x = (p.x + dx as f32) as f64;
                    let i = bilinear_sample_clamped(&lvl.image, y, x);
                    let ix = bilinear_sample_clamped(&lvl.grad_x, y, x);
                    let iy = bilinear_sample_clamped(&lvl.grad_y, y, x);
                    g[(0, 0)] += ix * ix;
                    g[(0, 1)] += ix * iy;
                    g[(1, 1)] += iy * iy;
                    template.push((i, ix, iy));
                }
            }
            g[(1, 0)] = g[(0, 1)];

            let half_trace = (g[(0, 0)] + g[(1, 1)]) * 0.5;
            let diff = (g[(0, 0)] - g[(1, 1)]) * 0.5;
            let min_eig = half_trace - (diff * diff + g[(0, 1)] * g[(0, 1)]).sqrt();
            if min_eig / area < LK_MIN_EIGEN_THRESHOLD {
                return None;
            }
            let g_inv = g.try_inverse()?;

            let (lh, lw) = next.dim();
            let mut v = Vector2::<f32>::zeros();
            for _ in 0..self.max_iterations {
                let base = p + guess + v;
                if base.x < -(half as f32)
                    || base.y < -(half as f32)
                    || base.x > (lw as i32 + half) as f32
                    || base.y > (lh as i32 + half) as f32
                {
                    return None;
                }
                let mut b = Vector2::<f32>::zeros();
                let mut k = 0;
                for dy in -half..=half {
                    for dx in -half..=half {
                        let (i, ix, iy) = template[k];
                        k += 1;
                        let j = bilinear_sample_clamped(
                            next,
                            (base.y + dy as f32) as f64,
                            (base.x + dx as f32) as f64,
                        );
                        let diff = i - j;
                        b.x += diff * ix;
                        b.y += diff * iy;
                    }
                }
                let eta = g_inv * b;
                v += eta;
                if eta.norm() < self.epsilon {
                    break;
                }
            }

            guess = if level > 0 { (guess + v) * 2.0 } else { guess + v };
        }

        Some(point + guess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_image(w: usize, h: usize, cx: f32, cy: f32) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(r, c)| {
            let d2 = (c as f32 - cx).powi(2) + (r as f32 - cy).powi(2);
            200.0 * (-d2 / 30.0).exp() + 20.0
        })
    }

    #[test]
    fn test_gftt_uniform_has_no_corners() {
        let img = Array2::from_elem((40, 40), 50.0f32);
        assert!(good_features_to_track(&img, 10, 0.01, 5.0, None).is_empty());
    }

    #[test]
    fn test_gftt_respects_min_distance_and_limit() {
        let img = Array2::from_shape_fn((60, 60), |(r, c)| {
            if (r / 6 + c / 6) % 2 == 0 { 200.0 } else { 30.0 }
        });
        let corners = good_features_to_track(&img, 8, 0.01, 10.0, None);
        assert!(!corners.is_empty());
        assert!(corners.len() <= 8);
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                assert!((*a - *b).norm() >= 10.0);
            }
        }
    }

    #[test]
    fn test_lk_tracks_shifted_blob() {
        let prev = blob_image(64, 64, 30.0, 32.0);
        let next = blob_image(64, 64, 32.5, 30.0);
        let lk = LucasKanade::new(&FlowConfig::default());
        let out = lk.track(&prev, &next, &[Point2::new(30.0, 32.0)]);
        let p = out[0].expect("blob should be tracked");
        assert!((p.x - 32.5).abs() < 0.1, "x={} should be ~32.5", p.x);
        assert!((p.y - 30.0).abs() < 0.1, "y={} should be ~30", p.y);
    }

    #[test]
    fn test_lk_loses_point_in_flat_region() {
        let prev = Array2::from_elem((64, 64), 80.0f32);
        let lk = LucasKanade::new(&FlowConfig::default());
        assert_eq!(lk.track(&prev, &prev, &[Point2::new(32.0, 32.0)]), vec![None]);
    }
}
