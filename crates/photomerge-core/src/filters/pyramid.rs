//! Gaussian and Laplacian pyramids on the 5-tap B3 spline kernel.

use ndarray::Array2;

use crate::consts::B3_KERNEL;

use super::gaussian_blur::{convolve_separable, Border};

/// Blur with the B3 kernel and keep every second row and column.
///
/// The output is `ceil(h/2) x ceil(w/2)`.
pub fn pyr_down(data: &Array2<f32>) -> Array2<f32> {
    let blurred = convolve_separable(data, &B3_KERNEL, Border::Reflect101);
    let (h, w) = data.dim();
    let (nh, nw) = (h.div_ceil(2), w.div_ceil(2));
    Array2::from_shape_fn((nh, nw), |(r, c)| blurred[[r * 2, c * 2]])
}

/// Upsample to `(height, width)` by zero insertion and B3 interpolation.
///
/// The target is expected to be the size of the level `data` was produced
/// from with [`pyr_down`].
pub fn pyr_up(data: &Array2<f32>, size: (usize, usize)) -> Array2<f32> {
    let (th, tw) = size;
    let (h, w) = data.dim();
    let mut spread = Array2::<f32>::zeros((th, tw));
    for r in 0..h.min(th.div_ceil(2)) {
        for c in 0..w.min(tw.div_ceil(2)) {
            if r * 2 < th && c * 2 < tw {
                spread[[r * 2, c * 2]] = data[[r, c]];
            }
        }
    }
    // Zero insertion loses 3/4 of the energy; the doubled kernel restores it.
    let kernel: Vec<f32> = B3_KERNEL.iter().map(|k| k * 2.0).collect();
    convolve_separable(&spread, &kernel, Border::Reflect101)
}

/// Gaussian pyramid with `levels` reduced levels (`levels + 1` entries).
pub fn gaussian_pyramid(data: &Array2<f32>, levels: usize) -> Vec<Array2<f32>> {
    let mut pyramid = Vec::with_capacity(levels + 1);
    pyramid.push(data.clone());
    for i in 0..levels {
        let next = pyr_down(&pyramid[i]);
        pyramid.push(next);
    }
    pyramid
}

/// Laplacian pyramid: band-pass levels plus the coarsest Gaussian level last.
pub fn laplacian_pyramid(data: &Array2<f32>, levels: usize) -> Vec<Array2<f32>> {
    let gauss = gaussian_pyramid(data, levels);
    let mut lap = Vec::with_capacity(levels + 1);
    for i in 0..levels {
        let up = pyr_up(&gauss[i + 1], gauss[i].dim());
        lap.push(&gauss[i] - &up);
    }
    lap.push(gauss[levels].clone());
    lap
}

/// Inverse of [`laplacian_pyramid`].
pub fn collapse_laplacian(pyramid: &[Array2<f32>]) -> Array2<f32> {
    let Some(mut current) = pyramid.last().cloned() else {
        return Array2::zeros((0, 0));
    };
    for band in pyramid.iter().rev().skip(1) {
        current = pyr_up(&current, band.dim()) + band;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyr_down_size() {
        let data = Array2::<f32>::zeros((21, 10));
        assert_eq!(pyr_down(&data).dim(), (11, 5));
    }

    #[test]
    fn test_pyr_up_keeps_constant() {
        let data = Array2::from_elem((8, 8), 3.0f32);
        let up = pyr_up(&data, (16, 16));
        for &v in up.iter() {
            assert!((v - 3.0).abs() < 1e-4, "v={} should be ~3", v);
        }
    }

    #[test]
    fn test_laplacian_roundtrip_is_exact() {
        let data = Array2::from_shape_fn((23, 17), |(r, c)| ((r * 7 + c * 13) % 11) as f32);
        let lap = laplacian_pyramid(&data, 3);
        let back = collapse_laplacian(&lap);
        for (a, b) in data.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-3, "a={} b={}", a, b);
        }
    }
}
