use nalgebra::{Matrix3, Matrix4, Point2, Vector4};

use crate::error::{MergeError, Result};

use super::ransac::{self, RansacFit, RansacParams, TransformModel};

/// Rotation, uniform scale and translation (4 degrees of freedom):
///
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
pub struct PartialAffine;

impl TransformModel for PartialAffine {
    const SAMPLE_SIZE: usize = 2;

    fn fit(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Matrix3<f64>> {
        let mut ata = Matrix4::<f64>::zeros();
        let mut atb = Vector4::<f64>::zeros();
        for (s, d) in src.iter().zip(dst) {
            let rows = [
                (Vector4::new(s.x, -s.y, 1.0, 0.0), d.x),
                (Vector4::new(s.y, s.x, 0.0, 1.0), d.y),
            ];
            for (row, rhs) in rows {
                ata += row * row.transpose();
                atb += row * rhs;
            }
        }
        let p = ata.lu().solve(&atb)?;
        let (a, b, tx, ty) = (p[0], p[1], p[2], p[3]);
        Some(Matrix3::new(a, -b, tx, b, a, ty, 0.0, 0.0, 1.0))
    }

    fn is_degenerate(src: &[Point2<f64>], dst: &[Point2<f64>]) -> bool {
        let close = |p: &[Point2<f64>]| (p[0] - p[1]).norm() < 1e-6;
        close(src) || close(dst)
    }
}

/// RANSAC partial affine transform mapping `src` onto `dst`.
pub fn estimate_partial_affine(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
) -> Result<RansacFit> {
    let fit = ransac::estimate::<PartialAffine>(src, dst, params)?;
    let m = &fit.transform;
    if m.iter().any(|v| !v.is_finite()) {
        return Err(MergeError::DegenerateTransform("non-finite affine transform".into()));
    }
    let scale2 = m[(0, 0)].powi(2) + m[(1, 0)].powi(2);
    if scale2 < 1e-6 {
        return Err(MergeError::DegenerateTransform("collapsed affine transform".into()));
    }
    Ok(fit)
}
