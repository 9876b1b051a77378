use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// How samples outside the image are produced during convolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Border {
    /// Repeat the edge sample.
    Replicate,
    /// Mirror without repeating the edge sample (`gfedcb|abcdefgh|gfedcba`).
    Reflect101,
}

impl Border {
    #[inline]
    pub fn index(self, i: isize, n: usize) -> usize {
        let n = n as isize;
        if n == 1 {
            return 0;
        }
        match self {
            Self::Replicate => i.clamp(0, n - 1) as usize,
            Self::Reflect101 => {
                let period = 2 * (n - 1);
                let mut m = i.rem_euclid(period);
                if m >= n {
                    m = period - m;
                }
                m as usize
            }
        }
    }
}

/// Gaussian blur of a single-channel image (separable, replicated border).
pub fn gaussian_blur_array(data: &Array2<f32>, sigma: f32) -> Array2<f32> {
    if sigma <= 0.0 {
        return data.clone();
    }
    let kernel = make_gaussian_kernel(sigma);
    convolve_separable(data, &kernel, Border::Replicate)
}

fn make_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    let size = 2 * radius + 1;
    let mut kernel = vec![0.0f32; size];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        *k = (-x * x / s2).exp();
        sum += *k;
    }

    for v in &mut kernel {
        *v /= sum;
    }

    kernel
}

/// Applies the same odd-length 1D kernel along rows, then columns.
pub fn convolve_separable(data: &Array2<f32>, kernel: &[f32], border: Border) -> Array2<f32> {
    let row_pass = convolve_axis(data, kernel, border, false);
    convolve_axis(&row_pass, kernel, border, true)
}

fn convolve_axis(data: &Array2<f32>, kernel: &[f32], border: Border, vertical: bool) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() as isize / 2;

    let row_fn = |row: usize| -> Vec<f32> {
        (0..w)
            .map(|col| {
                let mut sum = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    let off = ki as isize - radius;
                    let v = if vertical {
                        data[[border.index(row as isize + off, h), col]]
                    } else {
                        data[[row, border.index(col as isize + off, w)]]
                    };
                    sum += v * kv;
                }
                sum
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(row_fn).collect()
    } else {
        (0..h).map(row_fn).collect()
    };

    let mut result = Array2::<f32>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            result[[row, col]] = val;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect101_indices() {
        let b = Border::Reflect101;
        assert_eq!(b.index(-1, 5), 1);
        assert_eq!(b.index(-2, 5), 2);
        assert_eq!(b.index(5, 5), 3);
        assert_eq!(b.index(2, 5), 2);
        assert_eq!(b.index(-3, 1), 0);
    }

    #[test]
    fn test_blur_preserves_constant() {
        let data = Array2::from_elem((20, 20), 0.5f32);
        let out = gaussian_blur_array(&data, 2.0);
        for &v in out.iter() {
            assert!((v - 0.5).abs() < 1e-5, "v={} should be ~0.5", v);
        }
    }

    #[test]
    fn test_blur_spreads_impulse() {
        let mut data = Array2::<f32>::zeros((15, 15));
        data[[7, 7]] = 1.0;
        let out = gaussian_blur_array(&data, 1.5);
        assert!(out[[7, 7]] < 1.0);
        assert!(out[[7, 8]] > 0.0);
        let total: f32 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-4, "total={} should be ~1", total);
    }
}
