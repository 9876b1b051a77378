use photomerge_core::fusion::{FusionPolicy, Projection};
use photomerge_core::pipeline::config::{
    AlignmentConfig, AlignmentMethod, FlowConfig, MergeConfig,
};

#[test]
fn test_merge_config_json_round_trip() {
    let config = MergeConfig {
        policy: FusionPolicy::Panorama {
            projection: Projection::Spherical,
        },
        align: false,
        use_mask: true,
        alignment: AlignmentConfig {
            method: AlignmentMethod::OpticalFlow(FlowConfig::default()),
        },
    };
    let json = serde_json::to_string(&config).unwrap();
    let back: MergeConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_policy_labels() {
    assert_eq!(FusionPolicy::Average.label(), "longexposure_average");
    assert_eq!(FusionPolicy::ExposureFusion.label(), "hdr");
    assert_eq!(
        FusionPolicy::Panorama {
            projection: Projection::Cylindrical
        }
        .label(),
        "panorama_cylindrical"
    );
}

#[test]
fn test_alignment_requirement_per_policy() {
    let mut config = MergeConfig {
        align: false,
        ..MergeConfig::default()
    };
    assert!(!config.needs_alignment());
    config.policy = FusionPolicy::AlignOnly;
    assert!(config.needs_alignment());
    config.align = true;
    config.policy = FusionPolicy::Panorama {
        projection: Projection::Plane,
    };
    assert!(!config.needs_alignment());
}
