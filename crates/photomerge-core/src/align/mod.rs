pub mod affine;
pub mod dispatcher;
pub mod flow;
pub mod homography;
pub mod matcher;
pub mod orb;
pub mod ransac;
pub mod warp;

use crate::frame::Frame;

pub use dispatcher::{align_frames, align_frames_with_progress, prepare_reference, Reference};

/// Frames warped into the geometry of frame 0.
///
/// Frames that could not be registered are left out; `source_indices`
/// records where each kept frame came from in the input sequence.
#[derive(Clone, Debug, Default)]
pub struct Registration {
    pub frames: Vec<Frame>,
    pub source_indices: Vec<usize>,
}

impl Registration {
    /// At least one frame besides the reference was registered.
    pub fn is_aligned(&self) -> bool {
        self.frames.len() >= 2
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
