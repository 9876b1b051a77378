use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use photomerge_core::pipeline::config::{EngineConfig, MergeConfig};
use serde::{Deserialize, Serialize};

/// Container format of saved results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Tiff,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Tiff => "tiff",
        }
    }
}

/// Sample depth of saved results. JPEG is always written 8-bit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputDepth {
    /// Keep the depth the merge produced.
    #[default]
    Auto,
    #[value(name = "8")]
    Bits8,
    #[value(name = "16")]
    Bits16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub format: OutputFormat,
    pub depth: OutputDepth,
    pub jpeg_quality: u8,
    pub directory: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            depth: OutputDepth::Auto,
            jpeg_quality: 95,
            directory: PathBuf::from("."),
        }
    }
}

/// Everything the CLI persists between runs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub output: OutputSettings,
}

impl Settings {
    /// Read settings from a TOML file. Missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        toml::from_str(&contents).context("Invalid settings file")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photomerge_core::fusion::FusionPolicy;

    #[test]
    fn test_saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photomerge.toml");
        let mut settings = Settings::default();
        settings.merge.policy = FusionPolicy::FarthestFromAverage { threshold: 12 };
        settings.output.format = OutputFormat::Tiff;
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[output]\nformat = \"png\"\ndepth = \"bits16\"\njpeg_quality = 80\ndirectory = \"out\"\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.output.format, OutputFormat::Png);
        assert_eq!(settings.output.depth, OutputDepth::Bits16);
        assert_eq!(settings.merge, MergeConfig::default());
        assert_eq!(settings.engine, EngineConfig::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(&dir.path().join("absent.toml")).is_err());
    }
}
