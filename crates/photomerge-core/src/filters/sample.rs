use ndarray::Array2;

/// Bilinear interpolation with the edge samples replicated outward.
pub fn bilinear_sample_clamped(data: &Array2<f32>, y: f64, x: f64) -> f32 {
    let (h, w) = data.dim();
    let sample = |r: i64, c: i64| -> f32 {
        let r = r.clamp(0, h as i64 - 1) as usize;
        let c = c.clamp(0, w as i64 - 1) as usize;
        data[[r, c]]
    };
    interpolate(y, x, sample)
}

#[inline]
fn interpolate(y: f64, x: f64, sample: impl Fn(i64, i64) -> f32) -> f32 {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    let v00 = sample(y0, x0);
    let v10 = sample(y0, x0 + 1);
    let v01 = sample(y0 + 1, x0);
    let v11 = sample(y0 + 1, x0 + 1);

    v00 * (1.0 - fx) * (1.0 - fy) + v10 * fx * (1.0 - fy) + v01 * (1.0 - fx) * fy + v11 * fx * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bilinear_midpoint() {
        let data = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert!((bilinear_sample_clamped(&data, 0.5, 0.5) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_clamped_outside_repeats_edge() {
        let data = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(bilinear_sample_clamped(&data, -5.0, 10.0), 1.0);
        assert_eq!(bilinear_sample_clamped(&data, 5.0, -3.0), 2.0);
    }
}
