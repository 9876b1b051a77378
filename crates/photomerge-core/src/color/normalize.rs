use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::consts::{COLOR_CHANNEL_COUNT, DEPTH_SCALE_8_TO_16};
use crate::error::{MergeError, Result};
use crate::frame::{Frame, SampleDepth};

/// Channel order of a decoded raster, as handed over by the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelLayout {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    Gray,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Bgra => 4,
            Self::Gray => 1,
        }
    }

    /// Source channel index for each output R, G, B channel.
    fn rgb_order(self) -> Option<[usize; 3]> {
        match self {
            Self::Rgb | Self::Rgba => Some([0, 1, 2]),
            Self::Bgr | Self::Bgra => Some([2, 1, 0]),
            Self::Gray => None,
        }
    }
}

/// Decoded but not yet normalized raster: interleaved samples, row-major.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub width: usize,
    pub height: usize,
    pub layout: PixelLayout,
    pub bits: u8,
    pub samples: Vec<u16>,
}

/// Sample depth the engine works in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkingDepth {
    /// Keep the input depth; mixed sequences are promoted to 16-bit.
    #[default]
    Auto,
    Bits8,
    Bits16,
}

impl WorkingDepth {
    fn target(self, source: SampleDepth) -> SampleDepth {
        match self {
            Self::Auto => source,
            Self::Bits8 => SampleDepth::Eight,
            Self::Bits16 => SampleDepth::Sixteen,
        }
    }
}

/// Converts a raw raster into a canonical 3-channel RGB frame.
///
/// Alpha is discarded, BGR(A) is reordered and the samples are rescaled to
/// the working depth. Single-channel and unknown bit depths are rejected.
pub fn normalize_frame(raw: &RawFrame, depth: WorkingDepth) -> Result<Frame> {
    let source = SampleDepth::from_bits(raw.bits).ok_or(MergeError::UnsupportedLayout {
        channels: raw.layout.channels(),
        bits: raw.bits,
    })?;
    let order = raw.layout.rgb_order().ok_or(MergeError::UnsupportedLayout {
        channels: raw.layout.channels(),
        bits: raw.bits,
    })?;

    if raw.width == 0 || raw.height == 0 {
        return Err(MergeError::InvalidDimensions {
            width: raw.width,
            height: raw.height,
        });
    }

    let stride = raw.layout.channels();
    let expected = raw.width * raw.height * stride;
    if raw.samples.len() != expected {
        return Err(MergeError::BufferSize {
            expected,
            actual: raw.samples.len(),
        });
    }

    let max = source.max_value();
    let data = Array3::from_shape_fn(
        (raw.height, raw.width, COLOR_CHANNEL_COUNT),
        |(row, col, ch)| {
            let base = (row * raw.width + col) * stride;
            raw.samples[base + order[ch]].min(max)
        },
    );

    let frame = Frame { data, depth: source };
    Ok(convert_depth(&frame, depth.target(source)))
}

/// Rescales a frame between 8 and 16 bits (16→8 divides by 256, 8→16
/// multiplies by 256).
pub fn convert_depth(frame: &Frame, target: SampleDepth) -> Frame {
    let scale = DEPTH_SCALE_8_TO_16 as u16;
    let data = match (frame.depth, target) {
        (SampleDepth::Sixteen, SampleDepth::Eight) => frame.data.mapv(|v| v / scale),
        (SampleDepth::Eight, SampleDepth::Sixteen) => frame.data.mapv(|v| v * scale),
        _ => return frame.clone(),
    };
    Frame {
        data,
        depth: target,
    }
}

/// Promotes every frame to 16-bit when the sequence mixes depths.
pub fn unify_depth(frames: Vec<Frame>) -> Vec<Frame> {
    let mixed = frames
        .iter()
        .any(|f| f.depth != frames[0].depth);
    if !mixed {
        return frames;
    }
    debug!(count = frames.len(), "Mixed sample depths, promoting to 16-bit");
    frames
        .iter()
        .map(|f| convert_depth(f, SampleDepth::Sixteen))
        .collect()
}

/// Normalizes a batch. Frames that cannot be normalized are dropped with a
/// warning; the rest keep their relative order.
pub fn normalize_sequence(raws: &[RawFrame], depth: WorkingDepth) -> Vec<Frame> {
    let frames: Vec<Frame> = raws
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| match normalize_frame(raw, depth) {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(index = i, error = %e, "Skipping frame");
                None
            }
        })
        .collect();

    // Frames of a different size than the first cannot be fused with it.
    let frames = match frames.first() {
        Some(first) => {
            let (w, h) = (first.width(), first.height());
            frames
                .into_iter()
                .enumerate()
                .filter_map(|(i, f)| {
                    if f.width() == w && f.height() == h {
                        Some(f)
                    } else {
                        warn!(index = i, "Skipping frame with different dimensions");
                        None
                    }
                })
                .collect()
        }
        None => frames,
    };

    unify_depth(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(layout: PixelLayout, bits: u8, samples: Vec<u16>) -> RawFrame {
        RawFrame {
            width: 1,
            height: 1,
            layout,
            bits,
            samples,
        }
    }

    #[test]
    fn test_bgra_reordered_and_alpha_dropped() {
        let f = normalize_frame(&raw(PixelLayout::Bgra, 8, vec![1, 2, 3, 200]), WorkingDepth::Auto)
            .unwrap();
        assert_eq!(f.data.as_slice().unwrap(), &[3, 2, 1]);
        assert_eq!(f.depth, SampleDepth::Eight);
    }

    #[test]
    fn test_gray_rejected() {
        let r = normalize_frame(&raw(PixelLayout::Gray, 8, vec![1]), WorkingDepth::Auto);
        assert!(matches!(r, Err(MergeError::UnsupportedLayout { channels: 1, .. })));
    }

    #[test]
    fn test_depth_conversion_scales_by_256() {
        let f = normalize_frame(&raw(PixelLayout::Rgb, 16, vec![512, 65535, 255]), WorkingDepth::Bits8)
            .unwrap();
        assert_eq!(f.data.as_slice().unwrap(), &[2, 255, 0]);

        let g = normalize_frame(&raw(PixelLayout::Rgb, 8, vec![1, 255, 0]), WorkingDepth::Bits16)
            .unwrap();
        assert_eq!(g.data.as_slice().unwrap(), &[256, 65280, 0]);
    }

    #[test]
    fn test_buffer_size_checked() {
        let r = normalize_frame(&raw(PixelLayout::Rgb, 8, vec![1, 2]), WorkingDepth::Auto);
        assert!(matches!(r, Err(MergeError::BufferSize { expected: 3, actual: 2 })));
    }

    #[test]
    fn test_sequence_drops_bad_frames_and_promotes_mixed() {
        let raws = vec![
            raw(PixelLayout::Rgb, 8, vec![10, 20, 30]),
            raw(PixelLayout::Gray, 8, vec![1]),
            raw(PixelLayout::Rgb, 16, vec![1000, 2000, 3000]),
        ];
        let frames = normalize_sequence(&raws, WorkingDepth::Auto);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.depth == SampleDepth::Sixteen));
        assert_eq!(frames[0].data.as_slice().unwrap(), &[2560, 5120, 7680]);
    }
}
