//! Camera calibration and pose tracking for a chessboard AR overlay.
//!
//! This crate provides:
//! - [`ObservationStore`]: calibration samples, loaded from and captured to
//!   a directory of `calib{N}.png` files
//! - [`CalibrationEngine`]: the Unsolved -> Solved state machine that turns
//!   samples into intrinsics and per-frame detections into render matrices
//! - [`Session`]: a frame-synchronous loop over a [`FrameSource`] driven by
//!   [`UserAction`]s
//!
//! Corner detection is supplied by the caller through [`PatternDetector`];
//! the numerical backend through [`CameraSolver`] (the `linear` feature,
//! on by default, provides [`LinearSolver`]).
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_ar::{CalibrationEngine, LinearSolver, PatternSpec};
//! use calib_ar_core::ImageSize;
//! use image::GrayImage;
//! use nalgebra::Point2;
//!
//! # fn my_detector(_: &GrayImage, _: &PatternSpec) -> Option<Vec<Point2<f64>>> { None }
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pattern = PatternSpec::new(9, 6, 0.025)?;
//! let mut engine = CalibrationEngine::new(pattern, my_detector, LinearSolver::default());
//! engine.store_mut().load_from_directory("calibration")?;
//! engine.solve_intrinsics(ImageSize::new(640, 480))?;
//!
//! let frame = image::open("frame.png")?.to_rgb8();
//! if engine.detect_pattern(&frame, false, true) {
//!     let model = engine.update_pose(true)?;
//!     let render = engine.render_frame(Some(&model));
//!     println!("{:?}", render.model);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `calib_ar::core`: geometry, camera types, GL matrix conversion.
//! - `calib_ar::linear` (feature `linear`): closed-form solver backend.

mod config;
mod detect;
mod draw;
mod engine;
mod io;
mod mesh;
mod session;
mod store;

pub use calib_ar_core as core;
#[cfg(feature = "linear")]
pub use calib_ar_linear as linear;

pub use calib_ar_core::{
    CameraSolver, ClipPlanes, FrameExtrinsics, ImageSize, IntrinsicModel, PatternConfig,
    PatternError, PatternSpec, SolveError,
};
#[cfg(feature = "linear")]
pub use calib_ar_linear::{LinearSolver, LinearSolverParams};

pub use config::{ConfigError, ConfigIoError, SessionConfig};
pub use detect::{detect_in_frame, PatternDetector};
pub use draw::annotate;
pub use engine::{CalibrateError, CalibrationEngine, CalibrationState, PoseError, RenderFrame};
pub use io::{CalibrationFile, CalibrationIoError};
pub use mesh::{MeshVertex, OverlayMesh, Primitive};
pub use session::{
    ActionOutcome, FrameSource, Session, SessionError, StepOutcome, UserAction,
};
pub use store::{sample_file_name, Capture, Detection, Observation, ObservationStore, StoreError};

/// Solver configured from the session settings.
#[cfg(feature = "linear")]
pub fn linear_solver(config: &SessionConfig) -> LinearSolver {
    LinearSolver::new(config.linear)
}

/// Install the stderr logger at the configured level.
pub fn init_logging(config: &SessionConfig) -> Result<(), log::SetLoggerError> {
    calib_ar_core::init_from_config(config.log_level.as_deref())
}

#[cfg(feature = "tracing")]
pub use calib_ar_core::init_tracing;
