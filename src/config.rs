use anyhow::{Context, Result};
use gtm::DetectorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_transform_size")]
    pub transform_size: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    /// Skip frames whose mean linear magnitude exceeds this.
    #[serde(default)]
    pub noise_gate: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_transpose")]
    pub transpose: i32,
    #[serde(default = "default_time_multiplier")]
    pub time_multiplier: u64,
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            transform_size: default_transform_size(),
            hop_size: default_hop_size(),
            noise_gate: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            transpose: default_transpose(),
            time_multiplier: default_time_multiplier(),
            title: default_title(),
        }
    }
}

fn default_transform_size() -> usize { 8192 }
fn default_hop_size() -> usize { 256 }
fn default_transpose() -> i32 { 12 }
fn default_time_multiplier() -> u64 { 1 }
fn default_title() -> String { "gtm".into() }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// `./gtm.toml`, then `~/.config/gtm/config.toml`, then the platform config dir.
pub fn discover_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("gtm.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("gtm").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("gtm").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
