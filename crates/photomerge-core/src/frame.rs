use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::consts::COLOR_CHANNEL_COUNT;
use crate::error::{MergeError, Result};

/// Bits per channel of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleDepth {
    Eight,
    Sixteen,
}

impl SampleDepth {
    pub fn bits(self) -> u8 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
        }
    }

    /// Largest representable sample value.
    pub fn max_value(self) -> u16 {
        match self {
            Self::Eight => u8::MAX as u16,
            Self::Sixteen => u16::MAX,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(Self::Eight),
            16 => Some(Self::Sixteen),
            _ => None,
        }
    }
}

impl std::fmt::Display for SampleDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// A decoded raster. Samples are stored as u16 regardless of depth;
/// `depth` states the valid range.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Pixel data, shape = (height, width, channels).
    pub data: Array3<u16>,
    pub depth: SampleDepth,
}

impl Frame {
    /// Wraps a sample array, rejecting empty rasters and samples outside
    /// the depth range.
    pub fn new(data: Array3<u16>, depth: SampleDepth) -> Result<Self> {
        let (h, w, c) = data.dim();
        if h == 0 || w == 0 || c == 0 {
            return Err(MergeError::InvalidDimensions {
                width: w,
                height: h,
            });
        }
        let max = depth.max_value();
        if data.iter().any(|&v| v > max) {
            return Err(MergeError::UnsupportedLayout {
                channels: c,
                bits: depth.bits(),
            });
        }
        Ok(Self { data, depth })
    }

    /// Uniform RGB frame.
    pub fn filled(width: usize, height: usize, value: u16, depth: SampleDepth) -> Self {
        Self {
            data: Array3::from_elem((height, width, COLOR_CHANNEL_COUNT), value.min(depth.max_value())),
            depth,
        }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn channels(&self) -> usize {
        self.data.dim().2
    }

    /// True when both frames can take part in the same fusion.
    pub fn same_geometry(&self, other: &Frame) -> bool {
        self.data.dim() == other.data.dim() && self.depth == other.depth
    }
}

/// Binary mask restricting feature detection. 0 = excluded, anything
/// else = included.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    pub data: Array2<u8>,
}

impl Mask {
    pub const INCLUDED: u8 = 255;
    pub const EXCLUDED: u8 = 0;

    pub fn new(data: Array2<u8>) -> Self {
        Self { data }
    }

    /// Mask covering the whole frame.
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            data: Array2::from_elem((height, width), Self::INCLUDED),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn includes(&self, row: usize, col: usize) -> bool {
        self.data[[row, col]] != Self::EXCLUDED
    }

    pub fn matches(&self, frame: &Frame) -> bool {
        self.width() == frame.width() && self.height() == frame.height()
    }
}

/// Checks that every frame shares the geometry of frame 0.
pub fn check_sequence(frames: &[Frame]) -> Result<()> {
    let first = frames.first().ok_or(MergeError::EmptySequence)?;
    match frames.iter().position(|f| !f.same_geometry(first)) {
        Some(index) => Err(MergeError::GeometryMismatch { index }),
        None => Ok(()),
    }
}
