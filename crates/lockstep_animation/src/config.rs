//! Animator configuration (`lockstep.toml`)

use crate::error::{AnimatorError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Duration used when none is configured
pub const DEFAULT_DURATION_MS: u64 = 200;

/// Frame rate used by [`FrameThread`](crate::FrameThread) when none is configured
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// What happens when a callback panics mid-frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackPolicy {
    /// Log the panic and keep going with the remaining callbacks and frames
    #[default]
    Isolate,
    /// Let the panic unwind into the frame host, ending the frame and the run
    Propagate,
}

/// Animator settings
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnimatorConfig {
    /// Run length in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    #[serde(default)]
    pub callback_policy: CallbackPolicy,
    /// Tick rate for a background frame thread
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

fn default_duration_ms() -> u64 {
    DEFAULT_DURATION_MS
}

fn default_target_fps() -> u32 {
    DEFAULT_TARGET_FPS
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            callback_policy: CallbackPolicy::default(),
            target_fps: default_target_fps(),
        }
    }
}

impl AnimatorConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AnimatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration_ms == 0 {
            return Err(AnimatorError::InvalidDuration(
                "duration_ms must be greater than zero".to_string(),
            ));
        }
        if self.target_fps == 0 {
            return Err(AnimatorError::InvalidFrameRate(
                "target_fps must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
