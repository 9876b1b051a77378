mod common;

use ndarray::Array3;

use photomerge_core::frame::{Frame, SampleDepth};
use photomerge_core::fusion::{fuse, FusionPolicy, MergeStatus, ReferencePrimitives};

fn pseudo_random_frame(seed: u64, depth: SampleDepth) -> Frame {
    let max = depth.max_value() as u64 + 1;
    let mut state = seed;
    let data = Array3::from_shape_simple_fn((7, 9, 3), || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((state >> 33) % max) as u16
    });
    Frame::new(data, depth).unwrap()
}

fn check_rounded_mean(depth: SampleDepth) {
    let frames: Vec<Frame> = (1..=4).map(|s| pseudo_random_frame(s, depth)).collect();
    let out = fuse(&frames, &FusionPolicy::Average, &ReferencePrimitives);
    assert_eq!(out.status, MergeStatus::Merged);
    let avg = out.frame().unwrap();
    assert_eq!(avg.depth, depth);
    for ((r, c, ch), &v) in avg.data.indexed_iter() {
        let sum: f64 = frames.iter().map(|f| f.data[[r, c, ch]] as f64).sum();
        let expected = (sum / frames.len() as f64 + 0.5).floor() as u16;
        assert_eq!(v, expected, "pixel ({}, {}, {})", r, c, ch);
    }
}

#[test]
fn test_average_is_rounded_mean_8bit() {
    check_rounded_mean(SampleDepth::Eight);
}

#[test]
fn test_average_is_rounded_mean_16bit() {
    check_rounded_mean(SampleDepth::Sixteen);
}

#[test]
fn test_identical_frames_scenario() {
    let scene = common::textured_scene(100, 100, 10, 7, 0.0);
    let frame = common::crop_frame(&scene, 0, 0, 100, 100);
    let frames = vec![frame.clone(), frame.clone(), frame.clone()];

    for policy in [FusionPolicy::Average, FusionPolicy::Light, FusionPolicy::Dark] {
        let out = fuse(&frames, &policy, &ReferencePrimitives);
        assert_eq!(out.frame(), Some(&frame), "{} should reproduce the input", policy);
    }

    let hdr = fuse(&frames, &FusionPolicy::ExposureFusion, &ReferencePrimitives);
    let fused = hdr.frame().unwrap();
    let diff = common::mean_abs_diff(fused, &frame, 0..100, 0..100);
    assert!(diff < 1.0, "hdr diff={} should be ~0", diff);
}

#[test]
fn test_uniform_identical_frames_stay_uniform() {
    let frame = common::uniform_frame(100, 100, 200);
    let frames = vec![frame.clone(), frame.clone(), frame.clone()];
    let out = fuse(&frames, &FusionPolicy::ExposureFusion, &ReferencePrimitives);
    assert!(out.frame().unwrap().data.iter().all(|&v| v == 200));
}
