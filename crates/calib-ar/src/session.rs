//! Frame-synchronous driver: one frame in, detection, user actions, pose,
//! render matrices out.

use calib_ar_core::{CameraSolver, ImageSize};
use image::RgbImage;
use log::{info, warn};

use crate::config::{ConfigError, SessionConfig};
use crate::detect::PatternDetector;
use crate::engine::{CalibrateError, CalibrationEngine, PoseError, RenderFrame};
use crate::store::{Capture, StoreError};

/// Video input. `None` ends the session.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<RgbImage>;
}

impl<I: Iterator<Item = RgbImage>> FrameSource for I {
    fn next_frame(&mut self) -> Option<RgbImage> {
        self.next()
    }
}

/// Requests from the interactive layer, applied to the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserAction {
    /// Keep the current frame's detection as a calibration sample. Has no
    /// effect when the same step also carries [`UserAction::Capture`], which
    /// records the frame on its own.
    AddObservation,
    SolveIntrinsics,
    /// Replace the samples with the configured directory's contents and
    /// solve.
    LoadFromDirectory,
    /// Save the current frame into the configured directory as a sample.
    Capture,
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Calibrate(#[from] CalibrateError),
}

#[derive(Debug)]
pub enum ActionOutcome {
    Added(bool),
    Solved { rms_error: f64 },
    Loaded(usize),
    Captured(Capture),
    Failed(SessionError),
}

#[derive(Debug)]
pub struct StepOutcome {
    pub frame: RgbImage,
    pub detected: bool,
    /// Annotated frame when overlays are enabled.
    pub overlay: Option<RgbImage>,
    pub actions: Vec<(UserAction, ActionOutcome)>,
    /// Why the frame has no model matrix, if it has none.
    pub pose_error: Option<PoseError>,
    pub render: RenderFrame,
}

pub struct Session<F, D, S> {
    source: F,
    engine: CalibrationEngine<D, S>,
    config: SessionConfig,
    image_size: Option<ImageSize>,
}

impl<F, D, S> Session<F, D, S>
where
    F: FrameSource,
    D: PatternDetector,
    S: CameraSolver,
{
    pub fn new(
        config: SessionConfig,
        source: F,
        detector: D,
        solver: S,
    ) -> Result<Self, ConfigError> {
        let pattern = config.validate()?;
        let engine = CalibrationEngine::new(pattern, detector, solver)
            .with_clip_planes(config.clip)?
            .with_model_scale(config.model_scale)?;
        Ok(Self {
            source,
            engine,
            config,
            image_size: None,
        })
    }

    pub fn engine(&self) -> &CalibrationEngine<D, S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CalibrationEngine<D, S> {
        &mut self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Size of the session's frames, fixed by the first one.
    pub fn image_size(&self) -> Option<ImageSize> {
        self.image_size
    }

    fn solve(&mut self, size: ImageSize) -> ActionOutcome {
        match self.engine.solve_intrinsics(size) {
            Ok(model) => ActionOutcome::Solved {
                rms_error: model.rms_error,
            },
            Err(err) => ActionOutcome::Failed(err.into()),
        }
    }

    fn apply(
        &mut self,
        action: UserAction,
        frame: &RgbImage,
        size: ImageSize,
        recorded: bool,
        out: &mut Vec<(UserAction, ActionOutcome)>,
    ) {
        let dir = self.config.calibration_dir.clone();
        let outcome = match action {
            UserAction::AddObservation => ActionOutcome::Added(recorded),
            UserAction::SolveIntrinsics => self.solve(size),
            UserAction::LoadFromDirectory => {
                match self.engine.store_mut().load_from_directory(&dir) {
                    Ok(n) => {
                        info!("loaded {n} calibration sample(s) from {}", dir.display());
                        out.push((action, ActionOutcome::Loaded(n)));
                        self.solve(size)
                    }
                    Err(err) => ActionOutcome::Failed(err.into()),
                }
            }
            UserAction::Capture => match self.engine.store_mut().capture_and_store(&dir, frame) {
                Ok(capture) => ActionOutcome::Captured(capture),
                Err(err) => ActionOutcome::Failed(err.into()),
            },
        };
        if let ActionOutcome::Failed(err) = &outcome {
            warn!("{action:?} failed: {err}");
        }
        out.push((action, outcome));
    }

    /// Process the next frame. Returns `None` at end of stream; action and
    /// pose failures are reported in the outcome and never end the session.
    pub fn step(&mut self, actions: &[UserAction]) -> Option<StepOutcome> {
        let frame = self.source.next_frame()?;
        let size = *self
            .image_size
            .get_or_insert(ImageSize::new(frame.width(), frame.height()));
        if (frame.width(), frame.height()) != (size.width, size.height) {
            warn!(
                "frame is {}x{}, session started at {}x{}",
                frame.width(),
                frame.height(),
                size.width,
                size.height
            );
        }

        // a capture records the frame itself
        let add = actions.contains(&UserAction::AddObservation)
            && !actions.contains(&UserAction::Capture);
        let detected = self
            .engine
            .detect_pattern(&frame, add, self.config.draw_overlay);

        let mut reports = Vec::with_capacity(actions.len());
        for &action in actions {
            self.apply(action, &frame, size, add && detected, &mut reports);
        }

        let (model, pose_error) = if detected && self.engine.is_known() {
            match self.engine.update_pose(self.config.use_temporal_seed) {
                Ok(model) => (Some(model), None),
                Err(err) => (None, Some(err)),
            }
        } else if !self.engine.is_known() {
            (None, Some(PoseError::IntrinsicsUnknown))
        } else {
            (None, Some(PoseError::NoDetection))
        };
        let render = self.engine.render_frame(model.as_ref());

        Some(StepOutcome {
            overlay: self.engine.last_overlay().cloned(),
            frame,
            detected,
            actions: reports,
            pose_error,
            render,
        })
    }
}
