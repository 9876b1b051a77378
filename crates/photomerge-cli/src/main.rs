mod commands;
mod io;
mod progress;
mod settings;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "photomerge", about = "Align and merge photos of the same scene")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show image file metadata
    Info(commands::info::InfoArgs),
    /// Align and merge a sequence of photos
    Merge(commands::merge::MergeArgs),
    /// Print or save the default settings as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Merge(args) => commands::merge::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
