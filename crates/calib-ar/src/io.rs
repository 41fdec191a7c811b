//! JSON export of a solved calibration, so a later session can skip the
//! sample collection.

use std::fs;
use std::path::Path;

use calib_ar_core::{CameraIntrinsics, Distortion, ImageSize, IntrinsicModel, PatternConfig};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum CalibrationIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub pattern: PatternConfig,
    pub image_size: ImageSize,
    pub camera: CameraIntrinsics,
    pub distortion: Distortion,
    pub rms_error: f64,
    /// Number of samples the calibration was fitted to.
    pub view_count: usize,
}

impl CalibrationFile {
    pub fn from_model(pattern: PatternConfig, model: &IntrinsicModel) -> Self {
        Self {
            pattern,
            image_size: model.image_size,
            camera: model.camera,
            distortion: model.distortion,
            rms_error: model.rms_error,
            view_count: model.views.len(),
        }
    }

    /// The stored intrinsics; per-view poses are not persisted.
    pub fn to_model(&self) -> IntrinsicModel {
        IntrinsicModel {
            camera: self.camera,
            distortion: self.distortion,
            image_size: self.image_size,
            views: Vec::new(),
            rms_error: self.rms_error,
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrationIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
