use ndarray::Array3;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::frame::{check_sequence, Frame};

/// Per-pixel mean of same-geometry frames, accumulated in u64 and rounded
/// half up back to the input depth. `None` for an empty or mixed sequence.
pub fn average(frames: &[Frame]) -> Option<Frame> {
    check_sequence(frames).ok()?;
    let first = &frames[0];
    let (h, w, c) = first.data.dim();
    let n = frames.len() as u64;

    let row_fn = |row: usize| -> Vec<u16> {
        let mut sums = vec![0u64; w * c];
        for f in frames {
            for (i, v) in f.data.slice(ndarray::s![row, .., ..]).iter().enumerate() {
                sums[i] += *v as u64;
            }
        }
        sums.into_iter()
            .map(|s| ((2 * s + n) / (2 * n)) as u16)
            .collect()
    };

    let rows: Vec<Vec<u16>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(row_fn).collect()
    } else {
        (0..h).map(row_fn).collect()
    };

    let flat: Vec<u16> = rows.into_iter().flatten().collect();
    let data = Array3::from_shape_vec((h, w, c), flat).ok()?;
    Some(Frame {
        data,
        depth: first.depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SampleDepth;

    #[test]
    fn test_average_rounds_half_up() {
        let a = Frame::filled(2, 2, 1, SampleDepth::Eight);
        let b = Frame::filled(2, 2, 2, SampleDepth::Eight);
        let avg = average(&[a, b]).unwrap();
        assert!(avg.data.iter().all(|&v| v == 2));
    }

    #[test]
    fn test_average_16bit_no_overflow() {
        let a = Frame::filled(3, 1, 65535, SampleDepth::Sixteen);
        let b = Frame::filled(3, 1, 65533, SampleDepth::Sixteen);
        let avg = average(&[a.clone(), b, a]).unwrap();
        assert!(avg.data.iter().all(|&v| v == 65534));
        assert_eq!(avg.depth, SampleDepth::Sixteen);
    }

    #[test]
    fn test_average_empty_is_none() {
        assert!(average(&[]).is_none());
    }
}
