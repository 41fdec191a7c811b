//! Core types for the chessboard AR calibration session.
//!
//! This crate is purely geometric: the calibration target model, pinhole
//! camera types, the [`CameraSolver`] seam used to plug in a calibration
//! backend, and the conversion of a solved camera into OpenGL-style
//! projection/model matrices. It does not depend on any image type or
//! corner detector.

mod camera;
mod homography;
mod logger;
mod pattern;
mod projection;
mod solver;

pub use camera::{CameraIntrinsics, Distortion, FrameExtrinsics, ImageSize, IntrinsicModel};
pub use homography::{estimate_homography, Homography};
pub use pattern::{PatternConfig, PatternError, PatternSpec};
pub use projection::{clip_coords, gl_model, gl_projection, ndc_coords, to_gl_array, ClipPlanes};
pub use solver::{
    reprojection_rms, reprojection_sq_sum, CameraSolver, SolveError, ViewCorrespondences,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_config, init_with_level, parse_level};
