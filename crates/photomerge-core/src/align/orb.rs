//! Oriented FAST keypoints with rotated BRIEF descriptors.
//!
//! Keypoints are detected on a scale pyramid with FAST-9, ranked by Harris
//! response, oriented by the intensity centroid of a circular patch and
//! described by 256 intensity comparisons on a smoothed image.

use nalgebra::Point2;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::consts::{
    HARRIS_K, ORB_EDGE_THRESHOLD, ORB_PATCH_SIZE, ORB_PATTERN_SEED, PARALLEL_PIXEL_THRESHOLD,
};
use crate::filters::gaussian_blur::gaussian_blur_array;
use crate::filters::resize::resize_array;
use crate::frame::Mask;
use crate::pipeline::config::FeatureConfig;

pub const DESCRIPTOR_BYTES: usize = 32;
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

const PATTERN_PAIRS: usize = DESCRIPTOR_BYTES * 8;
const PATTERN_RADIUS: i32 = (ORB_PATCH_SIZE as i32 - 5) / 2;
const HALF_PATCH: i32 = ORB_PATCH_SIZE as i32 / 2;
const HARRIS_BLOCK_RADIUS: isize = 3;
const BRIEF_SIGMA: f32 = 2.0;

/// Bresenham circle of radius 3 as (dx, dy), in order around the centre.
const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

#[derive(Clone, Copy, Debug)]
pub struct Keypoint {
    /// Position in full-resolution pixel coordinates.
    pub position: Point2<f32>,
    pub level: usize,
    /// Orientation in radians.
    pub angle: f32,
    pub response: f32,
}

#[derive(Clone, Debug, Default)]
pub struct OrbFeatures {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl OrbFeatures {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

pub struct OrbDetector {
    config: FeatureConfig,
    pattern: Vec<[(i32, i32); 2]>,
}

impl OrbDetector {
    pub fn new(config: &FeatureConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(ORB_PATTERN_SEED);
        let r = PATTERN_RADIUS;
        let pattern = (0..PATTERN_PAIRS)
            .map(|_| {
                [
                    (rng.random_range(-r..=r), rng.random_range(-r..=r)),
                    (rng.random_range(-r..=r), rng.random_range(-r..=r)),
                ]
            })
            .collect();
        Self {
            config: config.clone(),
            pattern,
        }
    }

    /// Detects and describes keypoints on a 0..255 grayscale image.
    /// With a mask, only included pixels can become keypoints.
    pub fn detect(&self, gray: &Array2<f32>, mask: Option<&Mask>) -> OrbFeatures {
        let (h, w) = gray.dim();
        let levels = self.config.pyramid_levels.max(1);
        let scale_factor = self.config.scale_factor.max(1.0 + f32::EPSILON);
        let budgets = level_budgets(self.config.max_features, levels, scale_factor);
        let threshold = self.config.fast_threshold as f32;
        let min_side = 2 * ORB_EDGE_THRESHOLD + 1;

        let mut features = OrbFeatures::default();
        for (level, &budget) in budgets.iter().enumerate() {
            let scale = scale_factor.powi(level as i32);
            let lh = (h as f32 / scale).round() as usize;
            let lw = (w as f32 / scale).round() as usize;
            if lh < min_side || lw < min_side || budget == 0 {
                break;
            }
            let image = if level == 0 {
                gray.clone()
            } else {
                resize_array(gray, lh, lw)
            };

            let included = |r: usize, c: usize| match mask {
                Some(m) => {
                    // Pixels outside the mask are excluded.
                    let mr = (r as f32 * scale).round() as usize;
                    let mc = (c as f32 * scale).round() as usize;
                    mr < m.height() && mc < m.width() && m.includes(mr, mc)
                }
                None => true,
            };

            let mut corners = detect_fast(&image, threshold, &included);
            suppress_non_maxima(&mut corners, lh, lw);
            corners.sort_by(|a, b| b.2.total_cmp(&a.2));
            corners.truncate(budget);

            let smoothed = gaussian_blur_array(&image, BRIEF_SIGMA);
            for (r, c, response) in corners {
                let angle = intensity_centroid_angle(&image, r, c);
                features.descriptors.push(self.describe(&smoothed, r, c, angle));
                features.keypoints.push(Keypoint {
                    position: Point2::new(c as f32 * scale, r as f32 * scale),
                    level,
                    angle,
                    response,
                });
            }
        }

        debug!(keypoints = features.len(), "ORB detection");
        features
    }

    fn describe(&self, smoothed: &Array2<f32>, r: usize, c: usize, angle: f32) -> Descriptor {
        let (h, w) = smoothed.dim();
        let (sin, cos) = angle.sin_cos();
        let at = |(dx, dy): (i32, i32)| -> f32 {
            let rx = (cos * dx as f32 - sin * dy as f32).round() as isize;
            let ry = (sin * dx as f32 + cos * dy as f32).round() as isize;
            let y = (r as isize + ry).clamp(0, h as isize - 1) as usize;
            let x = (c as isize + rx).clamp(0, w as isize - 1) as usize;
            smoothed[[y, x]]
        };

        let mut desc = [0u8; DESCRIPTOR_BYTES];
        for (i, [p, q]) in self.pattern.iter().enumerate() {
            if at(*p) < at(*q) {
                desc[i / 8] |= 1 << (i % 8);
            }
        }
        desc
    }
}

/// Splits the feature budget over the levels as a geometric series, so
/// each level gets a share proportional to its area.
fn level_budgets(total: usize, levels: usize, scale_factor: f32) -> Vec<usize> {
    let factor = 1.0 / scale_factor;
    let first = total as f32 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));
    let mut budgets = Vec::with_capacity(levels);
    let mut assigned = 0usize;
    for level in 0..levels.saturating_sub(1) {
        let n = (first * factor.powi(level as i32)).round() as usize;
        let n = n.min(total - assigned);
        budgets.push(n);
        assigned += n;
    }
    budgets.push(total - assigned);
    budgets
}

/// FAST-9 segment test. Returns (row, col, harris response) for every
/// corner inside the edge margin that passes `included`.
fn detect_fast<F>(image: &Array2<f32>, threshold: f32, included: &F) -> Vec<(usize, usize, f32)>
where
    F: Fn(usize, usize) -> bool + Sync,
{
    let (h, w) = image.dim();
    let edge = ORB_EDGE_THRESHOLD;

    let row_fn = |r: usize| -> Vec<(usize, usize, f32)> {
        (edge..w - edge)
            .filter(|&c| included(r, c) && is_fast_corner(image, r, c, threshold))
            .map(|c| (r, c, harris_response(image, r, c)))
            .collect()
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (edge..h - edge).into_par_iter().flat_map(row_fn).collect()
    } else {
        (edge..h - edge).flat_map(row_fn).collect()
    }
}

fn is_fast_corner(image: &Array2<f32>, r: usize, c: usize, threshold: f32) -> bool {
    let p = image[[r, c]];
    let mut states = [0i8; 16];
    for (i, &(dx, dy)) in CIRCLE.iter().enumerate() {
        let v = image[[(r as isize + dy) as usize, (c as isize + dx) as usize]];
        states[i] = if v > p + threshold {
            1
        } else if v < p - threshold {
            -1
        } else {
            0
        };
    }

    // Quick rejection on the four compass points.
    let compass = [states[0], states[4], states[8], states[12]];
    if compass.iter().filter(|&&s| s == 1).count() < 2
        && compass.iter().filter(|&&s| s == -1).count() < 2
    {
        return false;
    }

    for target in [1i8, -1] {
        let mut run = 0;
        for i in 0..(16 + 9) {
            if states[i % 16] == target {
                run += 1;
                if run >= 9 {
                    return true;
                }
            } else {
                run = 0;
            }
        }
    }
    false
}

fn harris_response(image: &Array2<f32>, r: usize, c: usize) -> f32 {
    let mut sxx = 0.0f32;
    let mut syy = 0.0f32;
    let mut sxy = 0.0f32;
    for dy in -HARRIS_BLOCK_RADIUS..=HARRIS_BLOCK_RADIUS {
        for dx in -HARRIS_BLOCK_RADIUS..=HARRIS_BLOCK_RADIUS {
            let y = (r as isize + dy) as usize;
            let x = (c as isize + dx) as usize;
            let (gx, gy) = sobel(image, y, x);
            sxx += gx * gx;
            syy += gy * gy;
            sxy += gx * gy;
        }
    }
    let det = sxx * syy - sxy * sxy;
    let trace = sxx + syy;
    det - HARRIS_K * trace * trace
}

#[inline]
pub(crate) fn sobel(image: &Array2<f32>, y: usize, x: usize) -> (f32, f32) {
    let px = |dy: isize, dx: isize| image[[(y as isize + dy) as usize, (x as isize + dx) as usize]];
    let gx = (px(-1, 1) + 2.0 * px(0, 1) + px(1, 1)) - (px(-1, -1) + 2.0 * px(0, -1) + px(1, -1));
    let gy = (px(1, -1) + 2.0 * px(1, 0) + px(1, 1)) - (px(-1, -1) + 2.0 * px(-1, 0) + px(-1, 1));
    (gx, gy)
}

/// Keeps corners whose response is not exceeded by any 8-neighbour.
fn suppress_non_maxima(corners: &mut Vec<(usize, usize, f32)>, h: usize, w: usize) {
    let mut scores = Array2::<f32>::from_elem((h, w), f32::MIN);
    for &(r, c, s) in corners.iter() {
        scores[[r, c]] = s;
    }
    corners.retain(|&(r, c, s)| {
        for dy in -1isize..=1 {
            for dx in -1isize..=1 {
                if dy == 0 && dx == 0 {
                    continue;
                }
                let y = (r as isize + dy) as usize;
                let x = (c as isize + dx) as usize;
                let n = scores[[y, x]];
                // Ties go to the earlier pixel in raster order.
                if n > s || (n == s && (dy < 0 || (dy == 0 && dx < 0))) {
                    return false;
                }
            }
        }
        true
    });
}

fn intensity_centroid_angle(image: &Array2<f32>, r: usize, c: usize) -> f32 {
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;
    let radius2 = HALF_PATCH * HALF_PATCH;
    for dy in -HALF_PATCH..=HALF_PATCH {
        for dx in -HALF_PATCH..=HALF_PATCH {
            if dx * dx + dy * dy > radius2 {
                continue;
            }
            let v = image[[(r as i32 + dy) as usize, (c as i32 + dx) as usize]];
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bright squares on a dark background; every square corner is a
    /// FAST corner.
    fn squares(size: usize, cell: usize) -> Array2<f32> {
        Array2::from_shape_fn((size, size), |(r, c)| {
            if (r % (2 * cell)) < cell && (c % (2 * cell)) < cell {
                230.0
            } else {
                20.0
            }
        })
    }

    #[test]
    fn test_level_budgets_sum_to_total() {
        let b = level_budgets(500, 4, 1.2);
        assert_eq!(b.len(), 4);
        assert_eq!(b.iter().sum::<usize>(), 500);
        assert!(b[0] > b[3]);
    }

    #[test]
    fn test_uniform_image_has_no_keypoints() {
        let img = Array2::from_elem((80, 80), 128.0f32);
        let det = OrbDetector::new(&FeatureConfig::default());
        assert!(det.detect(&img, None).is_empty());
    }

    #[test]
    fn test_squares_have_keypoints_and_descriptors() {
        let det = OrbDetector::new(&FeatureConfig::default());
        let f = det.detect(&squares(96, 8), None);
        assert!(!f.is_empty());
        assert_eq!(f.keypoints.len(), f.descriptors.len());
        assert!(f.len() <= 500);
    }

    #[test]
    fn test_mask_excludes_region() {
        let det = OrbDetector::new(&FeatureConfig::default());
        let img = squares(96, 8);
        let mut mask = Mask::full(96, 96);
        for r in 0..96 {
            for c in 0..48 {
                mask.data[[r, c]] = Mask::EXCLUDED;
            }
        }
        let f = det.detect(&img, Some(&mask));
        assert!(f.keypoints.iter().all(|k| k.position.x >= 47.0));
    }

    #[test]
    fn test_pixels_beyond_a_smaller_mask_are_excluded() {
        let det = OrbDetector::new(&FeatureConfig::default());
        let img = squares(128, 8);
        let mask = Mask::full(64, 64);
        let f = det.detect(&img, Some(&mask));
        assert!(!f.is_empty());
        assert!(f
            .keypoints
            .iter()
            .all(|k| k.position.x < 64.5 && k.position.y < 64.5));
    }

    #[test]
    fn test_same_image_gives_same_descriptors() {
        let det = OrbDetector::new(&FeatureConfig::default());
        let img = squares(96, 8);
        let a = det.detect(&img, None);
        let b = det.detect(&img, None);
        assert_eq!(a.descriptors, b.descriptors);
    }
}
