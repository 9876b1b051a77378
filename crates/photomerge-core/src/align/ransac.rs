//! RANSAC over 2D point correspondences.

use nalgebra::{Matrix3, Point2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::consts::{RANSAC_CONFIDENCE, RANSAC_SEED};
use crate::error::{MergeError, Result};

use super::warp::project;

/// A transform family that can be fitted to point correspondences.
pub trait TransformModel {
    /// Correspondences in a minimal sample.
    const SAMPLE_SIZE: usize;

    /// Least-squares fit mapping `src` onto `dst`. Works for the minimal
    /// sample and for larger inlier sets.
    fn fit(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Matrix3<f64>>;

    /// Rejects samples that cannot define a unique model.
    fn is_degenerate(_src: &[Point2<f64>], _dst: &[Point2<f64>]) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RansacParams {
    pub threshold: f64,
    pub max_iterations: usize,
}

#[derive(Clone, Debug)]
pub struct RansacFit {
    pub transform: Matrix3<f64>,
    pub inliers: Vec<bool>,
}

impl RansacFit {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&b| b).count()
    }
}

/// Reprojection error of one correspondence.
#[inline]
pub fn reprojection_error(m: &Matrix3<f64>, src: &Point2<f64>, dst: &Point2<f64>) -> f64 {
    match project(m, src.x, src.y) {
        Some((x, y)) => ((x - dst.x).powi(2) + (y - dst.y).powi(2)).sqrt(),
        None => f64::INFINITY,
    }
}

fn mark_inliers(
    m: &Matrix3<f64>,
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    threshold: f64,
) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| reprojection_error(m, s, d) <= threshold)
        .collect()
}

/// Robustly fits `M` to the correspondences. Sampling uses a fixed seed so
/// the same input always produces the same transform. The winning model is
/// refitted on all of its inliers.
pub fn estimate<M: TransformModel>(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
) -> Result<RansacFit> {
    let n = src.len().min(dst.len());
    if n < M::SAMPLE_SIZE {
        return Err(MergeError::TooFewMatches {
            found: n,
            required: M::SAMPLE_SIZE,
        });
    }

    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
    let mut best: Option<(Matrix3<f64>, usize)> = None;
    let mut required = params.max_iterations.max(1);
    let mut iteration = 0;
    let mut sample_src = Vec::with_capacity(M::SAMPLE_SIZE);
    let mut sample_dst = Vec::with_capacity(M::SAMPLE_SIZE);

    while iteration < required {
        iteration += 1;
        sample_src.clear();
        sample_dst.clear();
        for i in rand::seq::index::sample(&mut rng, n, M::SAMPLE_SIZE) {
            sample_src.push(src[i]);
            sample_dst.push(dst[i]);
        }
        if M::is_degenerate(&sample_src, &sample_dst) {
            continue;
        }
        let Some(model) = M::fit(&sample_src, &sample_dst) else {
            continue;
        };
        let count = src[..n]
            .iter()
            .zip(&dst[..n])
            .filter(|(s, d)| reprojection_error(&model, s, d) <= params.threshold)
            .count();

        if best.map_or(true, |(_, c)| count > c) {
            best = Some((model, count));
            if count > 0 {
                let ratio = count as f64 / n as f64;
                let denom = (1.0 - ratio.powi(M::SAMPLE_SIZE as i32)).ln();
                let k = if denom < 0.0 {
                    ((1.0 - RANSAC_CONFIDENCE).ln() / denom).ceil()
                } else {
                    f64::INFINITY
                };
                if k.is_finite() {
                    required = required.min((k as usize).max(1));
                }
            }
        }
    }

    let (model, _) = best.ok_or_else(|| {
        MergeError::DegenerateTransform("no non-degenerate sample".into())
    })?;
    let mut inliers = mark_inliers(&model, &src[..n], &dst[..n], params.threshold);

    let (in_src, in_dst): (Vec<Point2<f64>>, Vec<Point2<f64>>) = src[..n]
        .iter()
        .zip(&dst[..n])
        .zip(&inliers)
        .filter(|(_, &keep)| keep)
        .map(|((s, d), _)| (*s, *d))
        .unzip();

    let mut transform = model;
    if in_src.len() >= M::SAMPLE_SIZE {
        if let Some(refined) = M::fit(&in_src, &in_dst) {
            let refined_inliers = mark_inliers(&refined, &src[..n], &dst[..n], params.threshold);
            let old = inliers.iter().filter(|&&b| b).count();
            if refined_inliers.iter().filter(|&&b| b).count() >= old {
                transform = refined;
                inliers = refined_inliers;
            }
        }
    }

    debug!(
        iterations = iteration,
        inliers = inliers.iter().filter(|&&b| b).count(),
        total = n,
        "RANSAC"
    );
    Ok(RansacFit { transform, inliers })
}

/// Hartley normalization: moves the centroid to the origin and scales the
/// mean distance to sqrt(2). Returns the normalized points and the matrix.
pub fn normalize_points(points: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    let n = points.len() as f64;
    if points.is_empty() {
        return None;
    }
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Some((normalized, t))
}
