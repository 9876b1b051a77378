/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum frame count to use frame-level Rayon parallelism.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// B3 spline 1D kernel coefficients: [1, 4, 6, 4, 1] / 16.
pub const B3_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Number of channels in a normalized color frame (R, G, B).
pub const COLOR_CHANNEL_COUNT: usize = 3;

/// Scale between 8-bit and 16-bit samples.
pub const DEPTH_SCALE_8_TO_16: u32 = 256;

/// Default longer side of the preview frame set, in pixels.
pub const DEFAULT_PREVIEW_MAX_DIM: usize = 1024;

/// Minimum number of frames for any fusion policy.
pub const MIN_FUSION_FRAMES: usize = 2;

/// Minimum number of frames for the per-pixel selection policies
/// (nearest/farthest to average, light, dark).
pub const MIN_SELECTION_FRAMES: usize = 3;

/// Default number of ORB keypoints kept per frame.
pub const DEFAULT_ORB_FEATURES: usize = 500;

/// Default number of ORB pyramid levels.
pub const DEFAULT_ORB_LEVELS: usize = 4;

/// Default scale factor between ORB pyramid levels.
pub const DEFAULT_ORB_SCALE_FACTOR: f32 = 1.2;

/// Default FAST intensity threshold.
pub const DEFAULT_FAST_THRESHOLD: u8 = 20;

/// Side of the square patch used for ORB orientation and descriptors.
pub const ORB_PATCH_SIZE: usize = 31;

/// Keypoints closer than this to the border are discarded.
pub const ORB_EDGE_THRESHOLD: usize = 16;

/// Seed of the fixed BRIEF sampling pattern. Reference and candidate
/// descriptors must come from the same pattern to be comparable.
pub const ORB_PATTERN_SEED: u64 = 0x0b5e_55ed_2019;

/// Harris detector free parameter.
pub const HARRIS_K: f32 = 0.04;

/// Default fraction of best-ranked matches kept before estimation.
pub const DEFAULT_KEEP_FRACTION: f32 = 0.8;

/// Default minimum number of surviving matches for homography estimation.
pub const DEFAULT_MIN_MATCHES: usize = 10;

/// Default RANSAC reprojection threshold for homographies, in pixels.
pub const DEFAULT_HOMOGRAPHY_THRESHOLD: f64 = 5.0;

/// Default RANSAC reprojection threshold for partial affine transforms.
pub const DEFAULT_AFFINE_THRESHOLD: f64 = 3.0;

/// Default upper bound on RANSAC iterations.
pub const DEFAULT_RANSAC_ITERATIONS: usize = 2000;

/// RANSAC confidence used to stop early once a good model is found.
pub const RANSAC_CONFIDENCE: f64 = 0.995;

/// Seed for RANSAC sampling, so registration is reproducible.
pub const RANSAC_SEED: u64 = 0x5eed;

/// Default number of corners tracked by the optical-flow strategy.
pub const DEFAULT_FLOW_CORNERS: usize = 200;

/// Default Shi-Tomasi quality level (fraction of the strongest corner).
pub const DEFAULT_CORNER_QUALITY: f64 = 0.01;

/// Default minimum distance between tracked corners, in pixels.
pub const DEFAULT_CORNER_MIN_DISTANCE: f64 = 30.0;

/// Default Lucas-Kanade window side.
pub const DEFAULT_LK_WINDOW: usize = 21;

/// Default Lucas-Kanade pyramid depth (levels above the original).
pub const DEFAULT_LK_LEVELS: usize = 3;

/// Default Lucas-Kanade iterations per level.
pub const DEFAULT_LK_ITERATIONS: usize = 30;

/// Default Lucas-Kanade convergence threshold, in pixels.
pub const DEFAULT_LK_EPSILON: f32 = 0.01;

/// Tracking is rejected when the minimum eigenvalue of the normalized
/// spatial gradient matrix falls below this.
pub const LK_MIN_EIGEN_THRESHOLD: f32 = 1e-4;

/// Lanczos kernel support (Lanczos-4 uses an 8x8 neighbourhood).
pub const LANCZOS_A: i64 = 4;

/// Mertens exposure-fusion: sigma of the well-exposedness Gaussian.
pub const MERTENS_EXPOSURE_SIGMA: f32 = 0.2;

/// Added to every Mertens weight so flat regions still blend evenly.
pub const MERTENS_WEIGHT_EPSILON: f32 = 1e-12;

/// Largest panorama canvas, as a multiple of the reference frame area.
pub const MAX_PANORAMA_AREA_FACTOR: usize = 16;

/// Largest value of the on-disk collision counter (`name_001` .. `name_998`).
pub const MAX_NAME_COUNTER: u32 = 998;
