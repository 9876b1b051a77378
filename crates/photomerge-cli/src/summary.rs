use std::path::PathBuf;

use console::Style;
use photomerge_core::pipeline::config::AlignmentMethod;

use crate::settings::Settings;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_merge_summary(settings: &Settings, inputs: &[PathBuf], mask: Option<&PathBuf>) {
    let s = Styles::new();
    let merge = &settings.merge;

    println!();
    println!("  {}", s.title.apply_to("PhotoMerge"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(10)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Inputs"),
        s.value.apply_to(format!("{} file(s)", inputs.len()))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(settings.output.directory.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Format"),
        s.value.apply_to(format!(
            "{} ({:?})",
            settings.output.format.extension(),
            settings.output.depth
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Merge"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Policy"),
        s.method.apply_to(&merge.policy)
    );

    if merge.needs_alignment() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Alignment"),
            s.method.apply_to(&merge.alignment.method)
        );
        match &merge.alignment.method {
            AlignmentMethod::Features(f) => println!(
                "    {:<12}{}",
                s.label.apply_to("Features"),
                s.value.apply_to(format!(
                    "{} max, keep {:.0}%, RANSAC {} px",
                    f.max_features,
                    f.keep_fraction * 100.0,
                    f.ransac_threshold
                ))
            ),
            AlignmentMethod::OpticalFlow(f) => println!(
                "    {:<12}{}",
                s.label.apply_to("Corners"),
                s.value.apply_to(format!(
                    "{} max, window {}, {} levels",
                    f.max_corners, f.window_size, f.pyramid_levels
                ))
            ),
        }
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Alignment"),
            s.disabled.apply_to("disabled")
        );
    }

    match mask {
        Some(path) if merge.use_mask => println!(
            "    {:<12}{}",
            s.label.apply_to("Mask"),
            s.path.apply_to(path.display())
        ),
        _ => println!(
            "    {:<12}{}",
            s.label.apply_to("Mask"),
            s.disabled.apply_to("none")
        ),
    }
    println!();
}
