use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use image::ImageReader;

use crate::io::describe_color;

#[derive(Args)]
pub struct InfoArgs {
    /// Input image files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    for (i, path) in args.files.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let reader = ImageReader::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .with_guessed_format()?;
        let format = reader.format();
        let img = reader
            .decode()
            .with_context(|| format!("Failed to decode {}", path.display()))?;
        let color = img.color();

        println!("File:        {}", path.display());
        if let Some(format) = format {
            println!("Format:      {:?}", format);
        }
        println!("Dimensions:  {}x{}", img.width(), img.height());
        println!("Bit depth:   {}", color.bits_per_pixel() / u16::from(color.channel_count()));
        println!("Color mode:  {}", describe_color(color));
    }

    Ok(())
}
