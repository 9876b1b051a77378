use nalgebra::{Matrix3, Point2, SMatrix};

use crate::error::{MergeError, Result};

use super::ransac::{self, normalize_points, RansacFit, RansacParams, TransformModel};

/// Full projective transform (8 degrees of freedom).
pub struct Homography;

impl TransformModel for Homography {
    const SAMPLE_SIZE: usize = 4;

    fn fit(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Matrix3<f64>> {
        let (ns, ts) = normalize_points(src)?;
        let (nd, td) = normalize_points(dst)?;

        // Accumulate A^T A directly; its smallest eigenvector is the DLT
        // solution and it stays 9x9 for any number of points.
        let mut ata = SMatrix::<f64, 9, 9>::zeros();
        for (s, d) in ns.iter().zip(&nd) {
            let rows = [
                [-s.x, -s.y, -1.0, 0.0, 0.0, 0.0, d.x * s.x, d.x * s.y, d.x],
                [0.0, 0.0, 0.0, -s.x, -s.y, -1.0, d.y * s.x, d.y * s.y, d.y],
            ];
            for row in &rows {
                for i in 0..9 {
                    for j in 0..9 {
                        ata[(i, j)] += row[i] * row[j];
                    }
                }
            }
        }

        let eigen = ata.symmetric_eigen();
        let (min_idx, _) = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        let h = eigen.eigenvectors.column(min_idx);
        let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        let h = td.try_inverse()? * hn * ts;
        let scale = h[(2, 2)];
        if scale.abs() < 1e-12 {
            return None;
        }
        Some(h / scale)
    }

    fn is_degenerate(src: &[Point2<f64>], dst: &[Point2<f64>]) -> bool {
        has_collinear_triple(src) || has_collinear_triple(dst)
    }
}

fn has_collinear_triple(p: &[Point2<f64>]) -> bool {
    for i in 0..p.len() {
        for j in i + 1..p.len() {
            for k in j + 1..p.len() {
                let area = (p[j].x - p[i].x) * (p[k].y - p[i].y)
                    - (p[j].y - p[i].y) * (p[k].x - p[i].x);
                if area.abs() < 1e-6 {
                    return true;
                }
            }
        }
    }
    false
}

/// RANSAC homography mapping `src` onto `dst`, rejecting non-finite and
/// near-singular results.
pub fn find_homography(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
) -> Result<RansacFit> {
    let fit = ransac::estimate::<Homography>(src, dst, params)?;
    let h = &fit.transform;
    if h.iter().any(|v| !v.is_finite()) {
        return Err(MergeError::DegenerateTransform("non-finite homography".into()));
    }
    if h.determinant().abs() < 1e-6 {
        return Err(MergeError::DegenerateTransform("singular homography".into()));
    }
    if fit.inlier_count() < Homography::SAMPLE_SIZE {
        return Err(MergeError::TooFewMatches {
            found: fit.inlier_count(),
            required: Homography::SAMPLE_SIZE,
        });
    }
    Ok(fit)
}
