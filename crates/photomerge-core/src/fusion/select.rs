//! Per-pixel frame selection.
//!
//! Nearest and farthest copy every output pixel whole from one of the
//! inputs (or, for farthest below the threshold, from the average). Light
//! and dark take the extreme value of each channel on its own.

use ndarray::{Array3, Zip};
use rayon::prelude::*;

use crate::consts::{MIN_SELECTION_FRAMES, PARALLEL_PIXEL_THRESHOLD};
use crate::frame::{check_sequence, Frame};

/// Builds an output whose pixel (r, c) is `pick(r, c)`'s pixel.
fn compose<'a, P>(frames: &'a [Frame], pick: P) -> Option<Frame>
where
    P: Fn(usize, usize) -> &'a Frame + Sync,
{
    let first = frames.first()?;
    let (h, w, c) = first.data.dim();

    let row_fn = |row: usize| -> Vec<u16> {
        let mut out = Vec::with_capacity(w * c);
        for col in 0..w {
            let src = pick(row, col);
            for ch in 0..c {
                out.push(src.data[[row, col, ch]]);
            }
        }
        out
    };

    let rows: Vec<Vec<u16>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(row_fn).collect()
    } else {
        (0..h).map(row_fn).collect()
    };
    let data = Array3::from_shape_vec((h, w, c), rows.into_iter().flatten().collect()).ok()?;
    Some(Frame {
        data,
        depth: first.depth,
    })
}

#[inline]
fn distance(a: &Frame, b: &Frame, row: usize, col: usize) -> u32 {
    (0..a.channels())
        .map(|ch| (a.data[[row, col, ch]] as i32 - b.data[[row, col, ch]] as i32).unsigned_abs())
        .sum()
}

fn valid(frames: &[Frame], average: Option<&Frame>) -> bool {
    frames.len() >= MIN_SELECTION_FRAMES
        && check_sequence(frames).is_ok()
        && average.map_or(true, |a| a.same_geometry(&frames[0]))
}

/// Per pixel, the frame with the smallest sum of absolute channel
/// differences to the average. Ties go to the earlier frame.
pub fn nearest_to_average(frames: &[Frame], average: &Frame) -> Option<Frame> {
    if !valid(frames, Some(average)) {
        return None;
    }
    compose(frames, |row, col| {
        let mut best = &frames[0];
        let mut best_d = u32::MAX;
        for f in frames {
            let d = distance(f, average, row, col);
            if d < best_d {
                best_d = d;
                best = f;
            }
        }
        best
    })
}

/// Per pixel, the frame farthest from the average if its distance is
/// above `threshold`, otherwise the average itself. Ties go to the earlier
/// frame.
pub fn farthest_from_average(frames: &[Frame], average: &Frame, threshold: u32) -> Option<Frame> {
    if !valid(frames, Some(average)) {
        return None;
    }
    compose(frames, |row, col| {
        let mut best = average;
        let mut best_d = threshold;
        for f in frames {
            let d = distance(f, average, row, col);
            if d > best_d {
                best_d = d;
                best = f;
            }
        }
        best
    })
}

/// Per-channel maximum (`light`) or minimum across all frames.
pub fn light_or_dark(frames: &[Frame], light: bool) -> Option<Frame> {
    if !valid(frames, None) {
        return None;
    }
    let pick = |acc: &mut u16, v: &u16| {
        *acc = if light { (*acc).max(*v) } else { (*acc).min(*v) };
    };
    let mut data = frames[0].data.clone();
    let (h, w, _) = data.dim();
    for f in &frames[1..] {
        let zip = Zip::from(&mut data).and(&f.data);
        if h * w >= PARALLEL_PIXEL_THRESHOLD {
            zip.par_for_each(pick);
        } else {
            zip.for_each(pick);
        }
    }
    Some(Frame {
        data,
        depth: frames[0].depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SampleDepth;

    fn px(values: [[u16; 3]; 2]) -> Frame {
        let data = Array3::from_shape_fn((1, 2, 3), |(_, c, ch)| values[c][ch]);
        Frame::new(data, SampleDepth::Eight).unwrap()
    }

    #[test]
    fn test_light_and_dark_are_per_channel() {
        let frames = vec![
            px([[200, 0, 0], [10, 10, 10]]),
            px([[0, 150, 0], [100, 5, 100]]),
            px([[0, 0, 100], [0, 40, 0]]),
        ];
        let light = light_or_dark(&frames, true).unwrap();
        assert_eq!(light.data.as_slice().unwrap(), &[200, 150, 100, 100, 40, 100]);
        let dark = light_or_dark(&frames, false).unwrap();
        assert_eq!(dark.data.as_slice().unwrap(), &[0, 0, 0, 0, 5, 0]);
    }

    #[test]
    fn test_nearest_to_average() {
        let frames = vec![
            px([[0, 0, 0], [90, 90, 90]]),
            px([[100, 100, 100], [60, 60, 60]]),
            px([[30, 30, 30], [10, 10, 10]]),
        ];
        let avg = px([[40, 40, 40], [50, 50, 50]]);
        let out = nearest_to_average(&frames, &avg).unwrap();
        assert_eq!(out.data.as_slice().unwrap(), &[30, 30, 30, 60, 60, 60]);
    }

    #[test]
    fn test_farthest_respects_threshold() {
        let frames = vec![
            px([[0, 0, 0], [52, 50, 50]]),
            px([[100, 100, 100], [50, 50, 50]]),
            px([[30, 30, 30], [48, 50, 50]]),
        ];
        let avg = px([[40, 40, 40], [50, 50, 50]]);
        let out = farthest_from_average(&frames, &avg, 10).unwrap();
        assert_eq!(out.data.as_slice().unwrap(), &[100, 100, 100, 50, 50, 50]);
    }

    #[test]
    fn test_two_frames_rejected() {
        let frames = vec![px([[0; 3]; 2]), px([[0; 3]; 2])];
        assert!(light_or_dark(&frames, true).is_none());
    }
}
