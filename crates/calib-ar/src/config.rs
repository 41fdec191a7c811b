//! Session configuration, loaded from JSON.

use std::fs;
use std::path::{Path, PathBuf};

use calib_ar_core::{ClipPlanes, PatternConfig, PatternError, PatternSpec};
use serde::{Deserialize, Serialize};

#[cfg(feature = "linear")]
use calib_ar_linear::LinearSolverParams;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("invalid clip planes: znear={znear}, zfar={zfar} (need 0 < znear < zfar)")]
    InvalidClipPlanes { znear: f64, zfar: f64 },
    #[error("model scale must be positive, got {0}")]
    InvalidModelScale(f64),
}

fn default_calibration_dir() -> PathBuf {
    PathBuf::from("calibration")
}

fn default_true() -> bool {
    true
}

fn default_model_scale() -> f64 {
    1.0
}

/// Everything the interactive layer would otherwise keep in globals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub pattern: PatternConfig,
    /// Where `calib{N}.png` samples are read from and written to.
    #[serde(default = "default_calibration_dir")]
    pub calibration_dir: PathBuf,
    #[serde(default = "default_true")]
    pub draw_overlay: bool,
    /// Seed each pose solve with the previous frame's pose.
    #[serde(default = "default_true")]
    pub use_temporal_seed: bool,
    #[serde(default)]
    pub clip: ClipPlanes,
    /// Uniform scale applied to overlay geometry.
    #[serde(default = "default_model_scale")]
    pub model_scale: f64,
    #[serde(default)]
    pub log_level: Option<String>,
    #[cfg(feature = "linear")]
    #[serde(default)]
    pub linear: LinearSolverParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pattern: PatternConfig::default(),
            calibration_dir: default_calibration_dir(),
            draw_overlay: true,
            use_temporal_seed: true,
            clip: ClipPlanes::default(),
            model_scale: default_model_scale(),
            log_level: None,
            #[cfg(feature = "linear")]
            linear: LinearSolverParams::default(),
        }
    }
}

impl SessionConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check the numeric settings and build the pattern.
    pub fn validate(&self) -> Result<PatternSpec, ConfigError> {
        if !self.clip.is_valid() {
            return Err(ConfigError::InvalidClipPlanes {
                znear: self.clip.znear,
                zfar: self.clip.zfar,
            });
        }
        if self.model_scale <= 0.0 || !self.model_scale.is_finite() {
            return Err(ConfigError::InvalidModelScale(self.model_scale));
        }
        Ok(PatternSpec::from_config(&self.pattern)?)
    }
}
