use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::settings::Settings;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write settings to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save the full default settings as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let settings = Settings::default();

    if let Some(ref path) = args.output {
        settings.save(path)?;
        println!("Default settings saved to {}", path.display());
    } else {
        print!("{}", settings.to_toml()?);
    }

    Ok(())
}
