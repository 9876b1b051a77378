use rayon::prelude::*;
use tracing::info;

use crate::error::{MergeError, Result};
use crate::filters::resize::{preview_size, resize_frame, resize_mask};
use crate::frame::{Frame, Mask};

/// Which copy of the loaded frames an operation works on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameSet {
    /// Downscaled copies for interactive use.
    Preview,
    /// Frames at their loaded resolution.
    Full,
}

impl std::fmt::Display for FrameSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preview => write!(f, "preview"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// The loaded frame sequence at both resolutions, plus the optional mask.
///
/// `generation` changes on every load or clear; `mask_version` on every
/// mask edit.
#[derive(Debug, Default)]
pub struct FrameStore {
    full: Vec<Frame>,
    preview: Vec<Frame>,
    full_mask: Option<Mask>,
    preview_mask: Option<Mask>,
    mask_version: u64,
    generation: u64,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole store with `frames` and drops the mask.
    pub fn replace(&mut self, frames: Vec<Frame>, preview_max_dim: usize) {
        self.preview = frames
            .par_iter()
            .map(|f| match preview_size(f.width(), f.height(), preview_max_dim) {
                Some((w, h)) => resize_frame(f, w, h),
                None => f.clone(),
            })
            .collect();
        self.full = frames;
        self.full_mask = None;
        self.preview_mask = None;
        self.mask_version += 1;
        self.generation += 1;
        info!(
            frames = self.full.len(),
            generation = self.generation,
            "Frame store loaded"
        );
    }

    pub fn clear(&mut self) {
        self.full.clear();
        self.preview.clear();
        self.full_mask = None;
        self.preview_mask = None;
        self.mask_version += 1;
        self.generation += 1;
    }

    pub fn frames(&self, set: FrameSet) -> &[Frame] {
        match set {
            FrameSet::Preview => &self.preview,
            FrameSet::Full => &self.full,
        }
    }

    pub fn mask(&self, set: FrameSet) -> Option<&Mask> {
        match set {
            FrameSet::Preview => self.preview_mask.as_ref(),
            FrameSet::Full => self.full_mask.as_ref(),
        }
    }

    /// Sets a full-resolution mask; the preview copy is derived from it.
    pub fn set_mask(&mut self, mask: Mask) -> Result<()> {
        let reference = self.full.first().ok_or(MergeError::EmptySequence)?;
        if !mask.matches(reference) {
            return Err(MergeError::MaskMismatch {
                mask_width: mask.width(),
                mask_height: mask.height(),
                width: reference.width(),
                height: reference.height(),
            });
        }
        self.preview_mask = self
            .preview
            .first()
            .map(|p| resize_mask(&mask, p.width(), p.height()));
        self.full_mask = Some(mask);
        self.mask_version += 1;
        Ok(())
    }

    /// Removes the mask. Returns false when there was none.
    pub fn clear_mask(&mut self) -> bool {
        if self.full_mask.is_none() {
            return false;
        }
        self.full_mask = None;
        self.preview_mask = None;
        self.mask_version += 1;
        true
    }

    pub fn has_mask(&self) -> bool {
        self.full_mask.is_some()
    }

    pub fn mask_version(&self) -> u64 {
        self.mask_version
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.full.len()
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty()
    }
}
