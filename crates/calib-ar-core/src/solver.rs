//! The seam between the calibration state machine and the numerical
//! routines that estimate intrinsics and poses.

use crate::camera::{CameraIntrinsics, Distortion, FrameExtrinsics, ImageSize, IntrinsicModel};
use nalgebra::{Point2, Point3};

/// Failures reported by a [`CameraSolver`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("need at least {required} views, got {got}")]
    TooFewViews { required: usize, got: usize },
    #[error("need at least {required} point correspondences, got {got}")]
    TooFewPoints { required: usize, got: usize },
    #[error("object/image point count mismatch ({object} vs {image})")]
    MismatchedLengths { object: usize, image: usize },
    #[error("degenerate configuration: {0}")]
    Degenerate(&'static str),
    #[error("solver produced non-finite values")]
    NonFinite,
}

/// Matched object/image corners of one calibration image.
#[derive(Clone, Copy, Debug)]
pub struct ViewCorrespondences<'a> {
    pub object_points: &'a [Point3<f64>],
    pub image_points: &'a [Point2<f64>],
}

impl<'a> ViewCorrespondences<'a> {
    pub fn new(object_points: &'a [Point3<f64>], image_points: &'a [Point2<f64>]) -> Self {
        Self {
            object_points,
            image_points,
        }
    }

    pub fn check_lengths(&self) -> Result<(), SolveError> {
        if self.object_points.len() != self.image_points.len() {
            return Err(SolveError::MismatchedLengths {
                object: self.object_points.len(),
                image: self.image_points.len(),
            });
        }
        Ok(())
    }
}

/// Camera calibration and pose estimation backend.
///
/// Implementations must treat their inputs as read-only and report every
/// numerical failure as a [`SolveError`]; callers rely on a failed call
/// leaving no trace.
pub trait CameraSolver {
    /// Fit intrinsics (and one pose per view) to a batch of planar views.
    fn calibrate(
        &self,
        views: &[ViewCorrespondences<'_>],
        image_size: ImageSize,
    ) -> Result<IntrinsicModel, SolveError>;

    /// Recover the pattern pose for one frame. `guess`, when present, is
    /// the previous frame's pose and may be used as a starting point.
    fn solve_pnp(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
        distortion: &Distortion,
        guess: Option<&FrameExtrinsics>,
    ) -> Result<FrameExtrinsics, SolveError>;
}

impl<S: CameraSolver + ?Sized> CameraSolver for Box<S> {
    fn calibrate(
        &self,
        views: &[ViewCorrespondences<'_>],
        image_size: ImageSize,
    ) -> Result<IntrinsicModel, SolveError> {
        (**self).calibrate(views, image_size)
    }

    fn solve_pnp(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
        distortion: &Distortion,
        guess: Option<&FrameExtrinsics>,
    ) -> Result<FrameExtrinsics, SolveError> {
        (**self).solve_pnp(object_points, image_points, camera, distortion, guess)
    }
}

/// Sum of squared pixel residuals and the number of projected points.
pub fn reprojection_sq_sum(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    camera: &CameraIntrinsics,
    distortion: &Distortion,
    pose: &FrameExtrinsics,
) -> Option<(f64, usize)> {
    let mut sum = 0.0;
    for (obj, img) in object_points.iter().zip(image_points) {
        let px = camera.project(distortion, &pose.transform(obj))?;
        sum += (px - *img).norm_squared();
    }
    Some((sum, object_points.len().min(image_points.len())))
}

/// RMS reprojection error in pixels; `None` if a point falls behind the camera.
pub fn reprojection_rms(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    camera: &CameraIntrinsics,
    distortion: &Distortion,
    pose: &FrameExtrinsics,
) -> Option<f64> {
    let (sum, n) = reprojection_sq_sum(object_points, image_points, camera, distortion, pose)?;
    (n > 0).then(|| (sum / n as f64).sqrt())
}
