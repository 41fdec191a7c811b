//! The calibration state machine.
//!
//! A [`CalibrationEngine`] starts `Unsolved`. A successful
//! [`CalibrationEngine::solve_intrinsics`] (or
//! [`CalibrationEngine::apply_calibration`]) moves it to `Solved`, after
//! which every frame's detection can be turned into a model matrix with
//! [`CalibrationEngine::solve_pose`]. Re-solving replaces the intrinsics
//! wholesale; a failed re-solve keeps the previous ones.

use calib_ar_core::{
    gl_model, gl_projection, to_gl_array, CameraSolver, ClipPlanes, FrameExtrinsics, ImageSize,
    IntrinsicModel, PatternSpec, SolveError,
};
use image::RgbImage;
use log::{debug, info, warn};
use nalgebra::{Matrix4, Point2};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::config::ConfigError;
use crate::detect::PatternDetector;
use crate::io::CalibrationFile;
use crate::store::ObservationStore;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrateError {
    #[error("no calibration samples: capture or load some first")]
    InsufficientSamples,
    #[error("calibration intrinsics are not usable")]
    InvalidIntrinsics,
    #[error(transparent)]
    Solver(#[from] SolveError),
}

/// Why no model matrix was produced for a frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("camera intrinsics are not known yet")]
    IntrinsicsUnknown,
    #[error("no pattern corners to solve from")]
    NoDetection,
    #[error(transparent)]
    Solver(#[from] SolveError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationState {
    Unsolved,
    Solved,
}

/// Matrices handed to the renderer, column-major.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderFrame {
    pub projection: [f32; 16],
    /// `None` when this frame has no pose; the overlay is skipped.
    pub model: Option<[f32; 16]>,
}

pub struct CalibrationEngine<D, S> {
    store: ObservationStore<D>,
    solver: S,
    clip: ClipPlanes,
    model_scale: f64,
    intrinsics: Option<IntrinsicModel>,
    projection: Matrix4<f64>,
    model: Matrix4<f64>,
    extrinsics: Option<FrameExtrinsics>,
    last_detection: Option<Vec<Point2<f64>>>,
    last_overlay: Option<RgbImage>,
}

impl<D: PatternDetector, S: CameraSolver> CalibrationEngine<D, S> {
    pub fn new(pattern: PatternSpec, detector: D, solver: S) -> Self {
        Self {
            store: ObservationStore::new(pattern, detector),
            solver,
            clip: ClipPlanes::default(),
            model_scale: 1.0,
            intrinsics: None,
            projection: Matrix4::identity(),
            model: Matrix4::identity(),
            extrinsics: None,
            last_detection: None,
            last_overlay: None,
        }
    }

    /// Clip planes used for the next projection matrix. Rebuilds the
    /// current one if intrinsics are known.
    pub fn with_clip_planes(mut self, clip: ClipPlanes) -> Result<Self, ConfigError> {
        if !clip.is_valid() {
            return Err(ConfigError::InvalidClipPlanes {
                znear: clip.znear,
                zfar: clip.zfar,
            });
        }
        self.clip = clip;
        if let Some(model) = &self.intrinsics {
            self.projection = gl_projection(&model.camera, model.image_size, clip);
        }
        Ok(self)
    }

    pub fn with_model_scale(mut self, scale: f64) -> Result<Self, ConfigError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ConfigError::InvalidModelScale(scale));
        }
        self.model_scale = scale;
        Ok(self)
    }

    pub fn pattern(&self) -> &PatternSpec {
        self.store.pattern()
    }

    pub fn store(&self) -> &ObservationStore<D> {
        &self.store
    }

    /// Mutable access for loading or capturing samples.
    pub fn store_mut(&mut self) -> &mut ObservationStore<D> {
        &mut self.store
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn state(&self) -> CalibrationState {
        if self.intrinsics.is_some() {
            CalibrationState::Solved
        } else {
            CalibrationState::Unsolved
        }
    }

    pub fn is_known(&self) -> bool {
        self.intrinsics.is_some()
    }

    pub fn intrinsics(&self) -> Option<&IntrinsicModel> {
        self.intrinsics.as_ref()
    }

    /// Identity until intrinsics are known.
    pub fn projection_matrix(&self) -> &Matrix4<f64> {
        &self.projection
    }

    /// Last successfully solved model matrix (identity before the first).
    pub fn model_matrix(&self) -> &Matrix4<f64> {
        &self.model
    }

    pub fn extrinsics(&self) -> Option<&FrameExtrinsics> {
        self.extrinsics.as_ref()
    }

    /// Corners of the most recent [`Self::detect_pattern`] call.
    pub fn last_detection(&self) -> Option<&[Point2<f64>]> {
        self.last_detection.as_deref()
    }

    /// Annotated frame of the most recent [`Self::detect_pattern`] call
    /// with `draw_overlay` set.
    pub fn last_overlay(&self) -> Option<&RgbImage> {
        self.last_overlay.as_ref()
    }

    /// Look for the pattern in `frame`, optionally recording a sample.
    /// Works in any state. Returns whether the pattern was found.
    pub fn detect_pattern(
        &mut self,
        frame: &RgbImage,
        add_to_store: bool,
        draw_overlay: bool,
    ) -> bool {
        let detection = self.store.try_detect(frame, draw_overlay);
        let found = detection.found();
        if let (true, Some(corners)) = (add_to_store, &detection.corners) {
            self.store.push_detection(frame, corners.clone());
            info!("added calibration sample #{}", self.store.len());
        }
        self.last_detection = detection.corners;
        self.last_overlay = detection.overlay;
        found
    }

    fn install(&mut self, model: IntrinsicModel) -> &IntrinsicModel {
        self.projection = gl_projection(&model.camera, model.image_size, self.clip);
        // the old pose belongs to the old camera
        self.extrinsics = None;
        self.intrinsics.insert(model)
    }

    /// Fit intrinsics to every stored sample.
    ///
    /// Fails with [`CalibrateError::InsufficientSamples`] on an empty store.
    /// Any failure leaves the previous intrinsics (if any) in place.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(samples = self.store.len()))
    )]
    pub fn solve_intrinsics(
        &mut self,
        image_size: ImageSize,
    ) -> Result<&IntrinsicModel, CalibrateError> {
        if self.store.is_empty() {
            warn!("cannot calibrate: capture or load calibration images first");
            return Err(CalibrateError::InsufficientSamples);
        }

        let model = {
            let views = self.store.views();
            self.solver.calibrate(&views, image_size)
        };
        let model = match model {
            Ok(model) if model.camera.is_valid() => model,
            Ok(_) => {
                warn!("calibration produced unusable intrinsics, keeping the previous state");
                return Err(CalibrateError::InvalidIntrinsics);
            }
            Err(err) => {
                warn!("calibration failed: {err}");
                return Err(err.into());
            }
        };

        info!(
            "calibrated from {} sample(s): fx={:.2} fy={:.2} cx={:.2} cy={:.2} rms={:.4}px",
            self.store.len(),
            model.camera.fx,
            model.camera.fy,
            model.camera.cx,
            model.camera.cy,
            model.rms_error
        );
        Ok(self.install(model))
    }

    /// Use previously saved intrinsics instead of solving.
    pub fn apply_calibration(&mut self, file: &CalibrationFile) -> Result<(), CalibrateError> {
        if !file.camera.is_valid() || file.image_size.width == 0 || file.image_size.height == 0 {
            return Err(CalibrateError::InvalidIntrinsics);
        }
        if file.pattern != self.pattern().config() {
            warn!(
                "calibration was made with a {}x{} pattern, current pattern is {}x{}",
                file.pattern.columns,
                file.pattern.rows,
                self.pattern().columns(),
                self.pattern().rows()
            );
        }
        info!(
            "applied saved calibration: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            file.camera.fx, file.camera.fy, file.camera.cx, file.camera.cy
        );
        self.install(file.to_model());
        Ok(())
    }

    /// Snapshot of the current intrinsics for [`CalibrationFile::write_json`].
    pub fn export_calibration(&self) -> Option<CalibrationFile> {
        self.intrinsics
            .as_ref()
            .map(|model| CalibrationFile::from_model(self.pattern().config(), model))
    }

    /// Pattern pose for one frame's corners, as a render model matrix.
    ///
    /// With `use_temporal_seed`, the previous frame's pose seeds the solver
    /// (never a pose from before the last intrinsic solve). On failure the
    /// stored pose and model matrix are left untouched.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image_points), fields(points = image_points.len()))
    )]
    pub fn solve_pose(
        &mut self,
        image_points: &[Point2<f64>],
        use_temporal_seed: bool,
    ) -> Result<Matrix4<f64>, PoseError> {
        let Some(intrinsics) = &self.intrinsics else {
            return Err(PoseError::IntrinsicsUnknown);
        };
        if image_points.is_empty() {
            return Err(PoseError::NoDetection);
        }

        let guess = if use_temporal_seed {
            self.extrinsics.as_ref()
        } else {
            None
        };
        let pose = self
            .solver
            .solve_pnp(
                self.store.pattern().object_points(),
                image_points,
                &intrinsics.camera,
                &intrinsics.distortion,
                guess,
            )
            .map_err(|err| {
                debug!("pose solve failed: {err}");
                PoseError::from(err)
            })?;

        self.model = gl_model(&pose, self.model_scale);
        self.extrinsics = Some(pose);
        Ok(self.model)
    }

    /// [`Self::solve_pose`] on the corners of the last detection.
    pub fn update_pose(&mut self, use_temporal_seed: bool) -> Result<Matrix4<f64>, PoseError> {
        let Some(corners) = self.last_detection.take() else {
            return Err(PoseError::NoDetection);
        };
        let result = self.solve_pose(&corners, use_temporal_seed);
        self.last_detection = Some(corners);
        result
    }

    /// Render matrices for a frame whose pose solve produced `model`.
    pub fn render_frame(&self, model: Option<&Matrix4<f64>>) -> RenderFrame {
        RenderFrame {
            projection: to_gl_array(&self.projection),
            model: model.map(to_gl_array),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_ar_core::{CameraIntrinsics, Distortion, ViewCorrespondences};
    use image::GrayImage;
    use nalgebra::{Point3, Vector3};
    use std::cell::Cell;

    /// Solver double: fixed answers, counts calls.
    struct FixedSolver {
        calibrations: Cell<usize>,
        fail_pnp: bool,
    }

    impl CameraSolver for FixedSolver {
        fn calibrate(
            &self,
            views: &[ViewCorrespondences<'_>],
            image_size: ImageSize,
        ) -> Result<IntrinsicModel, SolveError> {
            self.calibrations.set(self.calibrations.get() + 1);
            Ok(IntrinsicModel {
                camera: CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0),
                distortion: Distortion::zero(),
                image_size,
                views: vec![FrameExtrinsics::new(Vector3::zeros(), Vector3::z()); views.len()],
                rms_error: 0.1,
            })
        }

        fn solve_pnp(
            &self,
            _object_points: &[Point3<f64>],
            _image_points: &[Point2<f64>],
            _camera: &CameraIntrinsics,
            _distortion: &Distortion,
            guess: Option<&FrameExtrinsics>,
        ) -> Result<FrameExtrinsics, SolveError> {
            if self.fail_pnp {
                return Err(SolveError::Degenerate("collinear points"));
            }
            // encode whether a seed was passed in the translation
            let seeded = if guess.is_some() { 1.0 } else { 0.0 };
            Ok(FrameExtrinsics::new(
                Vector3::zeros(),
                Vector3::new(seeded, 0.0, 1.0),
            ))
        }
    }

    type Detector = fn(&GrayImage, &PatternSpec) -> Option<Vec<Point2<f64>>>;

    fn always(_: &GrayImage, p: &PatternSpec) -> Option<Vec<Point2<f64>>> {
        Some(
            p.object_points()
                .iter()
                .map(|o| Point2::new(o.x * 100.0 + 5.0, o.y * 100.0 + 5.0))
                .collect(),
        )
    }

    fn engine(fail_pnp: bool) -> CalibrationEngine<Detector, FixedSolver> {
        CalibrationEngine::new(
            PatternSpec::new(3, 3, 0.1).unwrap(),
            always as Detector,
            FixedSolver {
                calibrations: Cell::new(0),
                fail_pnp,
            },
        )
    }

    #[test]
    fn seed_is_dropped_after_resolve() {
        let mut e = engine(false);
        let frame = RgbImage::new(64, 48);
        assert!(e.detect_pattern(&frame, true, false));
        e.solve_intrinsics(ImageSize::new(64, 48)).unwrap();

        e.update_pose(true).unwrap();
        assert_eq!(e.extrinsics().unwrap().translation.x, 0.0);
        e.update_pose(true).unwrap();
        assert_eq!(e.extrinsics().unwrap().translation.x, 1.0);

        e.solve_intrinsics(ImageSize::new(64, 48)).unwrap();
        assert!(e.extrinsics().is_none());
        e.update_pose(true).unwrap();
        assert_eq!(e.extrinsics().unwrap().translation.x, 0.0);
        assert_eq!(e.solver().calibrations.get(), 2);
    }

    #[test]
    fn failed_pose_keeps_previous_state() {
        let mut e = engine(true);
        let frame = RgbImage::new(64, 48);
        e.detect_pattern(&frame, true, false);
        e.solve_intrinsics(ImageSize::new(64, 48)).unwrap();
        let before = *e.model_matrix();
        assert!(matches!(e.update_pose(true), Err(PoseError::Solver(_))));
        assert!(e.extrinsics().is_none());
        assert_eq!(*e.model_matrix(), before);
    }

    #[test]
    fn render_frame_skips_model_without_pose() {
        let e = engine(false);
        let frame = e.render_frame(None);
        assert!(frame.model.is_none());
        assert_eq!(frame.projection, to_gl_array(&Matrix4::identity()));
    }

    #[test]
    fn builders_reject_unusable_settings() {
        let bad_near = ClipPlanes {
            znear: 0.0,
            zfar: 10.0,
        };
        assert!(matches!(
            engine(false).with_clip_planes(bad_near),
            Err(ConfigError::InvalidClipPlanes { .. })
        ));
        let inverted = ClipPlanes {
            znear: 5.0,
            zfar: 1.0,
        };
        assert!(engine(false).with_clip_planes(inverted).is_err());
        assert!(matches!(
            engine(false).with_model_scale(-1.0),
            Err(ConfigError::InvalidModelScale(_))
        ));

        let mut e = engine(false)
            .with_clip_planes(ClipPlanes {
                znear: 0.1,
                zfar: 50.0,
            })
            .unwrap()
            .with_model_scale(2.0)
            .unwrap();
        e.detect_pattern(&RgbImage::new(64, 48), true, false);
        e.solve_intrinsics(ImageSize::new(64, 48)).unwrap();
        // (f + n) / (f - n) for the custom planes
        assert!((e.projection_matrix()[(2, 2)] + 50.1 / 49.9).abs() < 1e-12);
    }
}
