//! Lockstep configuration file handling

use anyhow::{Context, Result};
use lockstep_animation::AnimatorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the config file looked up in a directory
pub const CONFIG_FILE: &str = "lockstep.toml";

/// Top-level Lockstep configuration (lockstep.toml)
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LockstepConfig {
    #[serde(default)]
    pub animator: AnimatorConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Progress bar demo settings
#[derive(Debug, Deserialize, Serialize)]
pub struct DemoConfig {
    /// Number of bars animated in lockstep
    #[serde(default = "default_bars")]
    pub bars: usize,
    /// Bar width in characters
    #[serde(default = "default_width")]
    pub width: usize,
    /// Number of runs to play back to back
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_bars() -> usize {
    3
}

fn default_width() -> usize {
    40
}

fn default_repeat() -> u32 {
    1
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            bars: default_bars(),
            width: default_width(),
            repeat: default_repeat(),
        }
    }
}

impl LockstepConfig {
    /// Load configuration from a file, or from `lockstep.toml` in a directory
    pub fn load(path: &Path) -> Result<Self> {
        let config_path = config_path(path);

        if !config_path.exists() {
            anyhow::bail!(
                "No {} found at {}. Run `lockstep init` to create one.",
                CONFIG_FILE,
                path.display()
            );
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Parse and validate a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        let config: LockstepConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.animator.validate()?;
        if self.demo.bars == 0 {
            anyhow::bail!("demo.bars must be at least 1");
        }
        if self.demo.width == 0 {
            anyhow::bail!("demo.width must be at least 1");
        }
        Ok(())
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

/// Resolve a file or directory argument to the config file path
pub fn config_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILE)
    } else {
        path.to_path_buf()
    }
}
