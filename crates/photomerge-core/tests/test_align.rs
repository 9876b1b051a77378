mod common;

use approx::assert_abs_diff_eq;
use ndarray::s;
use photomerge_core::align::{align_frames, prepare_reference};
use photomerge_core::filters::gaussian_blur::gaussian_blur_array;
use photomerge_core::frame::Mask;
use photomerge_core::pipeline::config::{AlignmentConfig, AlignmentMethod, FlowConfig};

fn flow_config() -> AlignmentConfig {
    AlignmentConfig {
        method: AlignmentMethod::OpticalFlow(FlowConfig::default()),
    }
}

#[test]
fn test_identity_alignment_is_pixel_identical() {
    let scene = common::textured_scene(100, 100, 8, 11, 0.0);
    let frame = common::crop_frame(&scene, 0, 0, 100, 100);
    let reg = align_frames(&[frame.clone(), frame.clone()], None, &AlignmentConfig::default());
    assert_eq!(reg.len(), 2);
    assert_eq!(reg.source_indices, vec![0, 1]);
    assert_eq!(reg.frames[1], frame);
}

#[test]
fn test_featureless_frame_is_dropped() {
    let scene = common::textured_scene(100, 100, 8, 11, 0.0);
    let frame = common::crop_frame(&scene, 0, 0, 100, 100);
    let flat = common::uniform_frame(100, 100, 90);
    let frames = vec![frame.clone(), flat, frame.clone()];
    let reg = align_frames(&frames, None, &AlignmentConfig::default());
    assert_eq!(reg.len(), frames.len() - 1);
    assert_eq!(reg.source_indices, vec![0, 2]);
    assert!(reg.is_aligned());
}

#[test]
fn test_reference_frame_kept_unmodified() {
    let scene = common::textured_scene(120, 100, 8, 3, 0.0);
    let a = common::crop_frame(&scene, 0, 0, 100, 100);
    let b = common::crop_frame(&scene, 4, 0, 100, 100);
    let reg = align_frames(&[a.clone(), b], None, &AlignmentConfig::default());
    assert_eq!(reg.frames[0], a);
}

#[test]
fn test_fully_excluded_mask_aligns_nothing() {
    let scene = common::textured_scene(100, 100, 8, 11, 0.0);
    let frame = common::crop_frame(&scene, 0, 0, 100, 100);
    let mut mask = Mask::full(100, 100);
    mask.data.fill(Mask::EXCLUDED);
    let reg = align_frames(&[frame.clone(), frame], Some(&mask), &AlignmentConfig::default());
    assert_eq!(reg.len(), 1);
    assert!(!reg.is_aligned());
}

#[test]
fn test_optical_flow_recovers_translation() {
    // Frame B shows the scene shifted by (+3, +2) relative to frame A.
    // Both crops contain the darkest and brightest block, so their gray
    // levels stretch identically.
    let mut scene = common::textured_scene(140, 140, 10, 5, 0.0);
    scene.slice_mut(s![40..50, 40..50]).fill(0.0);
    scene.slice_mut(s![70..80, 70..80]).fill(255.0);
    let scene = gaussian_blur_array(&scene, 1.5);
    let a = common::crop_frame(&scene, 20, 20, 100, 100);
    let b = common::crop_frame(&scene, 17, 18, 100, 100);

    let config = flow_config();
    let reference = prepare_reference(&a, None, &config).unwrap();
    let t = reference.transform_for(&b).unwrap();
    assert_abs_diff_eq!(t[(0, 2)], -3.0, epsilon = 0.5);
    assert_abs_diff_eq!(t[(1, 2)], -2.0, epsilon = 0.5);
    assert_abs_diff_eq!(t[(0, 0)], 1.0, epsilon = 0.02);

    let reg = align_frames(&[a.clone(), b], None, &config);
    assert_eq!(reg.len(), 2);
    let err = common::mean_abs_diff(&reg.frames[1], &a, 10..90, 10..90);
    assert!(err < 4.0, "mean error={} should be small", err);
}

#[test]
fn test_feature_alignment_recovers_translation() {
    let scene = common::textured_scene(140, 140, 8, 21, 0.0);
    let a = common::crop_frame(&scene, 20, 20, 100, 100);
    let b = common::crop_frame(&scene, 24, 17, 100, 100);

    let config = AlignmentConfig::default();
    let reference = prepare_reference(&a, None, &config).unwrap();
    let t = reference.transform_for(&b).unwrap();
    assert_abs_diff_eq!(t[(0, 2)], 4.0, epsilon = 1.5);
    assert_abs_diff_eq!(t[(1, 2)], -3.0, epsilon = 1.5);
}

#[test]
fn test_mask_with_larger_candidate_does_not_abort() {
    let scene = common::textured_scene(180, 180, 8, 5, 0.0);
    let reference = common::crop_frame(&scene, 0, 0, 100, 100);
    let larger = common::crop_frame(&scene, 0, 0, 160, 160);
    let mask = Mask::full(100, 100);
    let reg = align_frames(
        &[reference.clone(), larger],
        Some(&mask),
        &AlignmentConfig::default(),
    );
    assert_eq!(reg.frames[0], reference);
    assert!(reg.frames.iter().all(|f| f.width() == 100 && f.height() == 100));
}
