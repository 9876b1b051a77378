use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::color::WorkingDepth;
use crate::consts::*;
use crate::fusion::FusionPolicy;

/// Session-wide settings that apply to every load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub depth: WorkingDepth,
    /// Longer side of the preview frame set.
    pub preview_max_dim: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            depth: WorkingDepth::Auto,
            preview_max_dim: DEFAULT_PREVIEW_MAX_DIM,
        }
    }
}

/// ORB + brute-force Hamming matching + RANSAC homography.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub max_features: usize,
    pub pyramid_levels: usize,
    pub scale_factor: f32,
    pub fast_threshold: u8,
    /// Fraction of the best-ranked matches kept (0.0..1.0).
    pub keep_fraction: f32,
    pub min_matches: usize,
    pub ransac_threshold: f64,
    pub ransac_iterations: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_features: DEFAULT_ORB_FEATURES,
            pyramid_levels: DEFAULT_ORB_LEVELS,
            scale_factor: DEFAULT_ORB_SCALE_FACTOR,
            fast_threshold: DEFAULT_FAST_THRESHOLD,
            keep_fraction: DEFAULT_KEEP_FRACTION,
            min_matches: DEFAULT_MIN_MATCHES,
            ransac_threshold: DEFAULT_HOMOGRAPHY_THRESHOLD,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
        }
    }
}

/// Shi-Tomasi corners + pyramidal Lucas-Kanade + partial affine RANSAC.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    pub max_corners: usize,
    pub quality_level: f64,
    pub min_distance: f64,
    pub window_size: usize,
    pub pyramid_levels: usize,
    pub max_iterations: usize,
    pub epsilon: f32,
    pub ransac_threshold: f64,
    pub ransac_iterations: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_corners: DEFAULT_FLOW_CORNERS,
            quality_level: DEFAULT_CORNER_QUALITY,
            min_distance: DEFAULT_CORNER_MIN_DISTANCE,
            window_size: DEFAULT_LK_WINDOW,
            pyramid_levels: DEFAULT_LK_LEVELS,
            max_iterations: DEFAULT_LK_ITERATIONS,
            epsilon: DEFAULT_LK_EPSILON,
            ransac_threshold: DEFAULT_AFFINE_THRESHOLD,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AlignmentMethod {
    Features(FeatureConfig),
    OpticalFlow(FlowConfig),
}

impl Default for AlignmentMethod {
    fn default() -> Self {
        Self::Features(FeatureConfig::default())
    }
}

impl std::fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Features(_) => write!(f, "Features"),
            Self::OpticalFlow(_) => write!(f, "Optical flow"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AlignmentConfig {
    pub method: AlignmentMethod,
}

impl AlignmentConfig {
    /// Every tuning value as raw bits. Equality and hashing both go through
    /// this, so `-0.0 != 0.0` and a NaN setting equals itself.
    fn key_bits(&self) -> (u8, [u64; 9]) {
        match &self.method {
            AlignmentMethod::Features(c) => (
                0,
                [
                    c.max_features as u64,
                    c.pyramid_levels as u64,
                    u64::from(c.scale_factor.to_bits()),
                    u64::from(c.fast_threshold),
                    u64::from(c.keep_fraction.to_bits()),
                    c.min_matches as u64,
                    c.ransac_threshold.to_bits(),
                    c.ransac_iterations as u64,
                    0,
                ],
            ),
            AlignmentMethod::OpticalFlow(c) => (
                1,
                [
                    c.max_corners as u64,
                    c.quality_level.to_bits(),
                    c.min_distance.to_bits(),
                    c.window_size as u64,
                    c.pyramid_levels as u64,
                    c.max_iterations as u64,
                    u64::from(c.epsilon.to_bits()),
                    c.ransac_threshold.to_bits(),
                    c.ransac_iterations as u64,
                ],
            ),
        }
    }
}

// Configs are used inside cache keys; floats compare by bit pattern there.
impl PartialEq for AlignmentConfig {
    fn eq(&self, other: &Self) -> bool {
        self.key_bits() == other.key_bits()
    }
}

impl Eq for AlignmentConfig {}

impl Hash for AlignmentConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_bits().hash(state);
    }
}

/// Parameters of one merge request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub policy: FusionPolicy,
    /// Register frames to frame 0 before fusing.
    pub align: bool,
    /// Restrict feature detection to the mask, when one is set.
    pub use_mask: bool,
    #[serde(default)]
    pub alignment: AlignmentConfig,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            policy: FusionPolicy::Average,
            align: true,
            use_mask: false,
            alignment: AlignmentConfig::default(),
        }
    }
}

impl MergeConfig {
    /// Whether this request registers frames before fusion. Align-only
    /// always does; panorama never does, the stitcher registers on its own.
    pub fn needs_alignment(&self) -> bool {
        match self.policy {
            FusionPolicy::AlignOnly => true,
            FusionPolicy::Panorama { .. } => false,
            _ => self.align,
        }
    }
}
