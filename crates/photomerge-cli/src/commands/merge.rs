use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use photomerge_core::color::WorkingDepth;
use photomerge_core::fusion::{FusionOutput, FusionPolicy, Projection};
use photomerge_core::pipeline::config::{AlignmentMethod, FeatureConfig, FlowConfig};
use photomerge_core::pipeline::{MergeEvent, MergeWorker};
use photomerge_core::store::FrameSet;
use tracing::warn;

use crate::io::{load_mask, load_raw_frame, output_name, save_output};
use crate::progress::StageBar;
use crate::settings::{OutputDepth, OutputFormat, Settings};
use crate::summary::print_merge_summary;

#[derive(Clone, Copy, ValueEnum)]
pub enum PolicyArg {
    Average,
    Nearest,
    Farthest,
    Light,
    Dark,
    Hdr,
    Panorama,
    Align,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ProjectionArg {
    Plane,
    Cylindrical,
    Spherical,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Features,
    Flow,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DepthArg {
    Auto,
    #[value(name = "8")]
    Bits8,
    #[value(name = "16")]
    Bits16,
}

#[derive(Args)]
pub struct MergeArgs {
    /// Input image files, the first one is the reference frame
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Settings file (TOML); command line options override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Merge policy
    #[arg(short, long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Per-pixel distance threshold for the farthest policy
    #[arg(long, default_value = "30")]
    pub threshold: u32,

    /// Panorama projection surface
    #[arg(long, value_enum, default_value = "plane")]
    pub projection: ProjectionArg,

    /// Skip alignment before merging
    #[arg(long)]
    pub no_align: bool,

    /// Alignment method
    #[arg(long, value_enum)]
    pub method: Option<MethodArg>,

    /// Mask image restricting where alignment features are detected
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Working sample depth
    #[arg(long, value_enum)]
    pub depth: Option<DepthArg>,

    /// Merge the downscaled preview frames instead of full resolution
    #[arg(long)]
    pub preview: bool,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Output base name (defaults to the first input's name)
    #[arg(long)]
    pub name: Option<String>,

    /// Output file format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Output sample depth
    #[arg(long, value_enum)]
    pub output_depth: Option<OutputDepth>,
}

pub fn run(args: &MergeArgs) -> Result<()> {
    let settings = build_settings(args)?;
    print_merge_summary(&settings, &args.files, args.mask.as_ref());

    let mut raws = Vec::with_capacity(args.files.len());
    for path in &args.files {
        match load_raw_frame(path) {
            Ok(raw) => raws.push(raw),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable input"),
        }
    }
    let mask = args.mask.as_deref().map(load_mask).transpose()?;

    let set = if args.preview {
        FrameSet::Preview
    } else {
        FrameSet::Full
    };

    let mut worker = MergeWorker::spawn(settings.engine.clone())?;
    worker.load(raws)?;
    if let Some(mask) = mask {
        worker.set_mask(mask)?;
    }
    worker.merge(set, settings.merge.clone())?;

    let output = wait_for_output(&worker)?;
    if output.is_empty() {
        bail!("{}", output.status);
    }

    let name = args.name.clone().unwrap_or_else(|| output_name(&args.files));
    let saved = save_output(&output.frames, &name, &output.label, &settings.output)?;

    println!();
    for path in saved {
        println!("Output saved to {}", path.display());
    }
    Ok(())
}

fn wait_for_output(worker: &MergeWorker) -> Result<std::sync::Arc<FusionOutput>> {
    let mut bar = StageBar::new()?;
    loop {
        match worker.recv()? {
            MergeEvent::Loaded { report, .. } => {
                if report.skipped > 0 {
                    warn!(skipped = report.skipped, "Some frames could not be used");
                }
            }
            MergeEvent::Progress {
                stage, done, total, ..
            } => bar.update(stage, done, total),
            MergeEvent::MergeComplete {
                output, elapsed, ..
            } => {
                bar.finish(&format!("Done in {:.1}s", elapsed.as_secs_f64()));
                return Ok(output);
            }
            MergeEvent::Error { message, .. } => {
                bar.finish("Failed");
                bail!(message);
            }
            MergeEvent::MaskUpdated { .. } | MergeEvent::Cleared { .. } => {}
        }
    }
}

fn build_settings(args: &MergeArgs) -> Result<Settings> {
    let mut settings = match args.config {
        Some(ref path) => Settings::load(path)
            .with_context(|| format!("Failed to load settings {}", path.display()))?,
        None => Settings::default(),
    };

    let merge = &mut settings.merge;
    if let Some(policy) = args.policy {
        merge.policy = policy_from_args(policy, args);
    }
    if args.no_align {
        merge.align = false;
    }
    if let Some(method) = args.method {
        merge.alignment.method = match method {
            MethodArg::Features => AlignmentMethod::Features(FeatureConfig::default()),
            MethodArg::Flow => AlignmentMethod::OpticalFlow(FlowConfig::default()),
        };
    }
    if args.mask.is_some() {
        merge.use_mask = true;
    }
    if let Some(depth) = args.depth {
        settings.engine.depth = match depth {
            DepthArg::Auto => WorkingDepth::Auto,
            DepthArg::Bits8 => WorkingDepth::Bits8,
            DepthArg::Bits16 => WorkingDepth::Bits16,
        };
    }
    if let Some(ref dir) = args.output_dir {
        settings.output.directory = dir.clone();
    }
    if let Some(format) = args.format {
        settings.output.format = format;
    }
    if let Some(depth) = args.output_depth {
        settings.output.depth = depth;
    }

    if args.mask.is_some() && !settings.merge.needs_alignment() {
        warn!("A mask only affects merges that align frames");
    }

    Ok(settings)
}

fn policy_from_args(policy: PolicyArg, args: &MergeArgs) -> FusionPolicy {
    match policy {
        PolicyArg::Average => FusionPolicy::Average,
        PolicyArg::Nearest => FusionPolicy::NearestToAverage,
        PolicyArg::Farthest => FusionPolicy::FarthestFromAverage {
            threshold: args.threshold,
        },
        PolicyArg::Light => FusionPolicy::Light,
        PolicyArg::Dark => FusionPolicy::Dark,
        PolicyArg::Hdr => FusionPolicy::ExposureFusion,
        PolicyArg::Panorama => FusionPolicy::Panorama {
            projection: match args.projection {
                ProjectionArg::Plane => Projection::Plane,
                ProjectionArg::Cylindrical => Projection::Cylindrical,
                ProjectionArg::Spherical => Projection::Spherical,
            },
        },
        PolicyArg::Align => FusionPolicy::AlignOnly,
    }
}
