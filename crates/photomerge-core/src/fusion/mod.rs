pub mod average;
pub mod exposure;
pub mod panorama;
pub mod primitives;
pub mod select;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::consts::{MIN_FUSION_FRAMES, MIN_SELECTION_FRAMES};
use crate::frame::{check_sequence, Frame};

pub use average::average;
pub use primitives::{FusionPrimitives, ReferencePrimitives};

/// Projection surface used by the panorama stitcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Projection {
    #[default]
    Plane,
    Cylindrical,
    Spherical,
}

impl Projection {
    pub fn name(self) -> &'static str {
        match self {
            Self::Plane => "plane",
            Self::Cylindrical => "cylindrical",
            Self::Spherical => "spherical",
        }
    }
}

/// How a frame sequence is combined into one output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FusionPolicy {
    /// Per-pixel mean.
    Average,
    /// Per pixel, the frame closest to the average.
    NearestToAverage,
    /// Per pixel, the frame farthest from the average when that distance
    /// exceeds `threshold` (sum of absolute channel differences).
    FarthestFromAverage { threshold: u32 },
    /// Per pixel, the brightest frame.
    Light,
    /// Per pixel, the darkest frame.
    Dark,
    /// Mertens exposure fusion.
    ExposureFusion,
    Panorama { projection: Projection },
    /// The registered frames themselves.
    AlignOnly,
}

impl FusionPolicy {
    /// Short label used in output file names.
    pub fn label(&self) -> String {
        match self {
            Self::Average => "longexposure_average".into(),
            Self::NearestToAverage => "longexposure_nearest_to_average".into(),
            Self::FarthestFromAverage { .. } => "longexposure_farthest_from_average".into(),
            Self::Light => "longexposure_light".into(),
            Self::Dark => "longexposure_dark".into(),
            Self::ExposureFusion => "hdr".into(),
            Self::Panorama { projection } => format!("panorama_{}", projection.name()),
            Self::AlignOnly => "align".into(),
        }
    }

    /// Minimum number of frames the policy accepts.
    pub fn min_frames(&self) -> usize {
        match self {
            Self::NearestToAverage
            | Self::FarthestFromAverage { .. }
            | Self::Light
            | Self::Dark => MIN_SELECTION_FRAMES,
            _ => MIN_FUSION_FRAMES,
        }
    }

    /// Whether the policy reads the per-pixel average.
    pub fn uses_average(&self) -> bool {
        matches!(
            self,
            Self::Average | Self::NearestToAverage | Self::FarthestFromAverage { .. }
        )
    }
}

impl fmt::Display for FusionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Average => write!(f, "Average"),
            Self::NearestToAverage => write!(f, "Nearest to average"),
            Self::FarthestFromAverage { threshold } => {
                write!(f, "Farthest from average (threshold {})", threshold)
            }
            Self::Light => write!(f, "Light"),
            Self::Dark => write!(f, "Dark"),
            Self::ExposureFusion => write!(f, "HDR exposure fusion"),
            Self::Panorama { projection } => write!(f, "Panorama ({})", projection.name()),
            Self::AlignOnly => write!(f, "Align only"),
        }
    }
}

/// Outcome of a merge request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStatus {
    Merged,
    NotEnoughImages,
    AlignmentFailed,
    MergeFailed,
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merged => write!(f, "Merged"),
            Self::NotEnoughImages => write!(f, "You must select at least 2 images"),
            Self::AlignmentFailed => write!(f, "Failed to align images !"),
            Self::MergeFailed => write!(f, "Failed to merge photos"),
        }
    }
}

/// Result of a fusion. `frames` is empty unless `status` is `Merged`;
/// align-only yields one frame per registered input.
#[derive(Clone, Debug)]
pub struct FusionOutput {
    pub frames: Vec<Frame>,
    pub label: String,
    pub status: MergeStatus,
}

impl FusionOutput {
    pub fn merged(frames: Vec<Frame>, label: String) -> Self {
        if frames.is_empty() {
            return Self::failed(MergeStatus::MergeFailed, label);
        }
        Self {
            frames,
            label,
            status: MergeStatus::Merged,
        }
    }

    pub fn failed(status: MergeStatus, label: String) -> Self {
        Self {
            frames: Vec::new(),
            label,
            status,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The single fused frame, if any.
    pub fn frame(&self) -> Option<&Frame> {
        self.frames.first()
    }
}

/// Combines `frames` under `policy`, computing the average when needed.
pub fn fuse(frames: &[Frame], policy: &FusionPolicy, primitives: &dyn FusionPrimitives) -> FusionOutput {
    fuse_with_average(frames, policy, primitives, None)
}

/// Combines `frames` under `policy`, reusing `average` when one was
/// already computed for the same frames.
///
/// Never fails hard: too few frames give `NotEnoughImages`, frames of
/// mixed geometry or an empty primitive result give `MergeFailed`.
pub fn fuse_with_average(
    frames: &[Frame],
    policy: &FusionPolicy,
    primitives: &dyn FusionPrimitives,
    average_frame: Option<&Frame>,
) -> FusionOutput {
    let label = policy.label();
    if frames.len() < policy.min_frames() {
        warn!(
            policy = %policy,
            frames = frames.len(),
            required = policy.min_frames(),
            "Not enough images"
        );
        return FusionOutput::failed(MergeStatus::NotEnoughImages, label);
    }

    // Panorama inputs overlap only partially and may differ in size.
    if !matches!(policy, FusionPolicy::Panorama { .. }) {
        if let Err(e) = check_sequence(frames) {
            warn!(error = %e, "Cannot fuse frames");
            return FusionOutput::failed(MergeStatus::MergeFailed, label);
        }
    }

    info!(policy = %policy, frames = frames.len(), "Fusion start");

    let computed;
    let avg = if policy.uses_average() {
        match average_frame {
            Some(a) => Some(a),
            None => {
                computed = average(frames);
                computed.as_ref()
            }
        }
    } else {
        None
    };

    let result: Option<Vec<Frame>> = match policy {
        FusionPolicy::Average => avg.map(|a| vec![a.clone()]),
        FusionPolicy::NearestToAverage => avg
            .and_then(|a| primitives.nearest_to_average(frames, a))
            .map(|f| vec![f]),
        FusionPolicy::FarthestFromAverage { threshold } => avg
            .and_then(|a| primitives.farthest_from_average(frames, a, *threshold))
            .map(|f| vec![f]),
        FusionPolicy::Light => primitives.light_or_dark(frames, true).map(|f| vec![f]),
        FusionPolicy::Dark => primitives.light_or_dark(frames, false).map(|f| vec![f]),
        FusionPolicy::ExposureFusion => exposure::exposure_fusion(frames).map(|f| vec![f]),
        FusionPolicy::Panorama { projection } => {
            primitives.stitch(frames, *projection).map(|f| vec![f])
        }
        FusionPolicy::AlignOnly => Some(frames.to_vec()),
    };

    let output = match result {
        Some(frames) => FusionOutput::merged(frames, label),
        None => FusionOutput::failed(MergeStatus::MergeFailed, label),
    };
    info!(policy = %policy, status = %output.status, "Fusion complete");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SampleDepth;

    #[test]
    fn test_labels() {
        assert_eq!(FusionPolicy::ExposureFusion.label(), "hdr");
        assert_eq!(
            FusionPolicy::Panorama {
                projection: Projection::Cylindrical
            }
            .label(),
            "panorama_cylindrical"
        );
        assert_eq!(FusionPolicy::Light.label(), "longexposure_light");
    }

    #[test]
    fn test_mixed_geometry_is_merge_failed() {
        let a = Frame::filled(4, 4, 1, SampleDepth::Eight);
        let b = Frame::filled(5, 4, 1, SampleDepth::Eight);
        let out = fuse(&[a, b], &FusionPolicy::Average, &ReferencePrimitives);
        assert_eq!(out.status, MergeStatus::MergeFailed);
        assert!(out.is_empty());
    }

    #[test]
    fn test_provided_average_is_reused() {
        let a = Frame::filled(2, 2, 10, SampleDepth::Eight);
        let marker = Frame::filled(2, 2, 77, SampleDepth::Eight);
        let out = fuse_with_average(
            &[a.clone(), a],
            &FusionPolicy::Average,
            &ReferencePrimitives,
            Some(&marker),
        );
        assert_eq!(out.frame(), Some(&marker));
    }
}
