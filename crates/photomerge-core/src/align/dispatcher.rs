use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{Matrix3, Point2};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::color::normalized_gray;
use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::error::{MergeError, Result};
use crate::frame::{Frame, Mask};
use crate::pipeline::config::{AlignmentConfig, AlignmentMethod, FeatureConfig, FlowConfig};

use super::affine::estimate_partial_affine;
use super::flow::{good_features_to_track, LucasKanade};
use super::homography::find_homography;
use super::matcher::{keep_best, match_descriptors};
use super::orb::{OrbDetector, OrbFeatures};
use super::ransac::RansacParams;
use super::warp::warp_perspective;
use super::Registration;

/// Everything computed once on frame 0 and shared by all candidates.
pub enum Reference<'a> {
    Features {
        config: &'a FeatureConfig,
        detector: OrbDetector,
        features: OrbFeatures,
        mask: Option<&'a Mask>,
    },
    OpticalFlow {
        config: &'a FlowConfig,
        tracker: LucasKanade,
        gray: Array2<f32>,
        corners: Vec<Point2<f32>>,
    },
}

/// Detects features (or corners) on the reference frame.
pub fn prepare_reference<'a>(
    reference: &Frame,
    mask: Option<&'a Mask>,
    config: &'a AlignmentConfig,
) -> Result<Reference<'a>> {
    let gray = normalized_gray(reference);
    match &config.method {
        AlignmentMethod::Features(params) => {
            let detector = OrbDetector::new(params);
            let features = detector.detect(&gray, mask);
            if features.len() < params.min_matches {
                return Err(MergeError::TooFewMatches {
                    found: features.len(),
                    required: params.min_matches,
                });
            }
            Ok(Reference::Features {
                config: params,
                detector,
                features,
                mask,
            })
        }
        AlignmentMethod::OpticalFlow(params) => {
            let corners = good_features_to_track(
                &gray,
                params.max_corners,
                params.quality_level,
                params.min_distance,
                mask,
            );
            if corners.len() < 2 {
                return Err(MergeError::TooFewMatches {
                    found: corners.len(),
                    required: 2,
                });
            }
            Ok(Reference::OpticalFlow {
                config: params,
                tracker: LucasKanade::new(params),
                gray,
                corners,
            })
        }
    }
}

impl Reference<'_> {
    /// Transform taking `candidate` pixel coordinates to reference
    /// coordinates.
    pub fn transform_for(&self, candidate: &Frame) -> Result<Matrix3<f64>> {
        let gray = normalized_gray(candidate);
        match self {
            Reference::Features {
                config,
                detector,
                features,
                mask,
            } => {
                // The mask is in reference geometry; it only applies to
                // candidates of the same size.
                let found = detector.detect(&gray, mask.filter(|m| m.matches(candidate)));
                let matches = keep_best(
                    match_descriptors(&found.descriptors, &features.descriptors),
                    config.keep_fraction,
                );
                if matches.len() < config.min_matches {
                    return Err(MergeError::TooFewMatches {
                        found: matches.len(),
                        required: config.min_matches,
                    });
                }
                let (src, dst): (Vec<_>, Vec<_>) = matches
                    .iter()
                    .map(|m| {
                        let s = found.keypoints[m.query].position;
                        let d = features.keypoints[m.train].position;
                        (
                            Point2::new(s.x as f64, s.y as f64),
                            Point2::new(d.x as f64, d.y as f64),
                        )
                    })
                    .unzip();
                let params = RansacParams {
                    threshold: config.ransac_threshold,
                    max_iterations: config.ransac_iterations,
                };
                Ok(find_homography(&src, &dst, &params)?.transform)
            }
            Reference::OpticalFlow {
                config,
                tracker,
                gray: reference_gray,
                corners,
            } => {
                let tracked = tracker.track(reference_gray, &gray, corners);
                let (src, dst): (Vec<_>, Vec<_>) = corners
                    .iter()
                    .zip(&tracked)
                    .filter_map(|(r, t)| {
                        t.map(|t| {
                            (
                                Point2::new(t.x as f64, t.y as f64),
                                Point2::new(r.x as f64, r.y as f64),
                            )
                        })
                    })
                    .unzip();
                let params = RansacParams {
                    threshold: config.ransac_threshold,
                    max_iterations: config.ransac_iterations,
                };
                Ok(estimate_partial_affine(&src, &dst, &params)?.transform)
            }
        }
    }

    /// Estimates the transform and warps `candidate` into the reference
    /// geometry.
    pub fn register(&self, candidate: &Frame, width: usize, height: usize) -> Result<Frame> {
        let transform = self.transform_for(candidate)?;
        warp_perspective(candidate, &transform, width, height)
    }
}

/// Aligns every frame to frame 0.
pub fn align_frames(frames: &[Frame], mask: Option<&Mask>, config: &AlignmentConfig) -> Registration {
    align_frames_with_progress(frames, mask, config, |_| {})
}

/// Aligns every frame to frame 0, calling `on_frame_done` with the number
/// of processed frames after each one.
///
/// Frames that fail to register are dropped. Frame 0 is always kept
/// unmodified.
pub fn align_frames_with_progress<F>(
    frames: &[Frame],
    mask: Option<&Mask>,
    config: &AlignmentConfig,
    on_frame_done: F,
) -> Registration
where
    F: Fn(usize) + Send + Sync,
{
    let Some(first) = frames.first() else {
        return Registration::default();
    };

    let mask = mask.filter(|m| {
        let ok = m.matches(first);
        if !ok {
            warn!(
                mask_w = m.width(),
                mask_h = m.height(),
                "Mask does not match the reference frame, ignoring it"
            );
        }
        ok
    });

    let counter = AtomicUsize::new(1);
    on_frame_done(1);

    let reference = match prepare_reference(first, mask, config) {
        Ok(r) => Some(r),
        Err(e) => {
            debug!(error = %e, "Reference frame has too few features");
            None
        }
    };
    let (width, height) = (first.width(), first.height());

    let register_one = |i: usize, frame: &Frame| -> Option<Frame> {
        let result = match &reference {
            Some(r) => r.register(frame, width, height),
            None => Err(MergeError::DegenerateTransform("no reference features".into())),
        };
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        on_frame_done(done);
        match result {
            Ok(f) => Some(f),
            Err(e) => {
                debug!(frame = i, error = %e, "Dropping frame that failed to align");
                None
            }
        }
    };

    let candidates: Vec<(usize, Option<Frame>)> = if frames.len() >= PARALLEL_FRAME_THRESHOLD {
        frames
            .par_iter()
            .enumerate()
            .skip(1)
            .map(|(i, f)| (i, register_one(i, f)))
            .collect()
    } else {
        frames
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, f)| (i, register_one(i, f)))
            .collect()
    };

    let mut registration = Registration {
        frames: vec![first.clone()],
        source_indices: vec![0],
    };
    for (i, frame) in candidates {
        if let Some(f) = frame {
            registration.frames.push(f);
            registration.source_indices.push(i);
        }
    }

    info!(
        method = %config.method,
        aligned = registration.len(),
        total = frames.len(),
        "Alignment complete"
    );
    registration
}
