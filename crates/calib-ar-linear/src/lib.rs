//! Closed-form [`CameraSolver`] backend.
//!
//! Intrinsics come from plane homographies (Zhang's method for three or more
//! views, a focal-only model below that). Poses are recovered by homography
//! decomposition and polished with a few Gauss-Newton steps on the
//! reprojection error. Lens distortion is not estimated.
//!
//! ```
//! use calib_ar_core::{CameraSolver, PatternSpec};
//! use calib_ar_linear::LinearSolver;
//!
//! let pattern = PatternSpec::new(9, 6, 0.025).unwrap();
//! let solver = LinearSolver::default();
//! // Too few points for a pose: the solver reports it instead of panicking.
//! let err = solver.solve_pnp(
//!     &pattern.object_points()[..3],
//!     &[nalgebra::Point2::origin(); 3],
//!     &calib_ar_core::CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0),
//!     &calib_ar_core::Distortion::zero(),
//!     None,
//! );
//! assert!(err.is_err());
//! ```

mod intrinsics;
mod pose;

pub use intrinsics::{focal_only_intrinsics, zhang_intrinsics, MIN_VIEWS_FULL};
pub use pose::{check_spread, planar_pose, pose_from_homography, refine_pose, Refined};

use calib_ar_core::{
    estimate_homography, CameraIntrinsics, CameraSolver, Distortion, FrameExtrinsics, ImageSize,
    IntrinsicModel, SolveError, ViewCorrespondences,
};
use log::{debug, info};
use nalgebra::{Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimum correspondences for a homography.
pub const MIN_POINTS: usize = 4;

/// Tuning knobs of [`LinearSolver`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverParams {
    /// Gauss-Newton iterations per pose.
    pub refine_iterations: usize,
    /// A seeded pose that ends above this RMS (pixels) is discarded in
    /// favour of the linear initialisation.
    pub max_seed_rms_px: f64,
}

impl Default for LinearSolverParams {
    fn default() -> Self {
        Self {
            refine_iterations: 20,
            max_seed_rms_px: 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LinearSolver {
    pub params: LinearSolverParams,
}

impl LinearSolver {
    pub fn new(params: LinearSolverParams) -> Self {
        Self { params }
    }

    fn check_view(view: &ViewCorrespondences<'_>) -> Result<(), SolveError> {
        view.check_lengths()?;
        if view.image_points.len() < MIN_POINTS {
            return Err(SolveError::TooFewPoints {
                required: MIN_POINTS,
                got: view.image_points.len(),
            });
        }
        Ok(())
    }

    fn plane_homography(view: &ViewCorrespondences<'_>) -> Result<Matrix3<f64>, SolveError> {
        let src: Vec<Point2<f64>> = view
            .object_points
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect();
        estimate_homography(&src, view.image_points)
            .map(|h| h.h)
            .ok_or(SolveError::Degenerate("homography fit failed"))
    }

    fn linear_then_refine(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
        distortion: &Distortion,
    ) -> Result<Refined, SolveError> {
        let init = planar_pose(object_points, image_points, camera, distortion)?;
        Ok(refine_pose(
            object_points,
            image_points,
            camera,
            distortion,
            &init,
            self.params.refine_iterations,
        ))
    }
}

impl CameraSolver for LinearSolver {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, views), fields(views = views.len()))
    )]
    fn calibrate(
        &self,
        views: &[ViewCorrespondences<'_>],
        image_size: ImageSize,
    ) -> Result<IntrinsicModel, SolveError> {
        if views.is_empty() {
            return Err(SolveError::TooFewViews {
                required: 1,
                got: 0,
            });
        }

        let mut hmtxs = Vec::with_capacity(views.len());
        for view in views {
            Self::check_view(view)?;
            check_spread(view.image_points.iter().map(|p| (p.x, p.y)))?;
            hmtxs.push(Self::plane_homography(view)?);
        }

        let camera = if hmtxs.len() >= MIN_VIEWS_FULL {
            zhang_intrinsics(&hmtxs, image_size)?
        } else {
            debug!(
                "{} view(s): fixing the principal point at the image centre",
                hmtxs.len()
            );
            focal_only_intrinsics(&hmtxs, image_size)?
        };
        let distortion = Distortion::zero();

        let mut poses = Vec::with_capacity(views.len());
        let mut sq_sum = 0.0;
        let mut count = 0usize;
        for view in views {
            let refined =
                self.linear_then_refine(view.object_points, view.image_points, &camera, &distortion)?;
            if !refined.rms.is_finite() || !refined.pose.is_finite() {
                return Err(SolveError::NonFinite);
            }
            let n = view.image_points.len();
            sq_sum += refined.rms * refined.rms * n as f64;
            count += n;
            poses.push(refined.pose);
        }
        let rms_error = (sq_sum / count as f64).sqrt();

        info!(
            "linear calibration over {} view(s): fx={:.2} fy={:.2} cx={:.2} cy={:.2} rms={:.4}px",
            views.len(),
            camera.fx,
            camera.fy,
            camera.cx,
            camera.cy,
            rms_error
        );

        Ok(IntrinsicModel {
            camera,
            distortion,
            image_size,
            views: poses,
            rms_error,
        })
    }

    fn solve_pnp(
        &self,
        object_points: &[Point3<f64>],
        image_points: &[Point2<f64>],
        camera: &CameraIntrinsics,
        distortion: &Distortion,
        guess: Option<&FrameExtrinsics>,
    ) -> Result<FrameExtrinsics, SolveError> {
        Self::check_view(&ViewCorrespondences::new(object_points, image_points))?;
        check_spread(image_points.iter().map(|p| (p.x, p.y)))?;
        check_spread(object_points.iter().map(|p| (p.x, p.y)))?;
        if !camera.is_valid() {
            return Err(SolveError::Degenerate("camera intrinsics are not usable"));
        }

        let seeded = guess.filter(|g| g.is_finite()).map(|g| {
            refine_pose(
                object_points,
                image_points,
                camera,
                distortion,
                g,
                self.params.refine_iterations,
            )
        });

        let refined = match seeded {
            Some(r) if r.rms <= self.params.max_seed_rms_px => r,
            Some(r) => {
                debug!(
                    "seeded pose ended at {:.3}px rms, re-initialising linearly",
                    r.rms
                );
                self.linear_then_refine(object_points, image_points, camera, distortion)?
            }
            None => self.linear_then_refine(object_points, image_points, camera, distortion)?,
        };

        if !refined.pose.is_finite() || !refined.rms.is_finite() {
            return Err(SolveError::NonFinite);
        }
        Ok(refined.pose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn grid() -> Vec<Point3<f64>> {
        (0..6)
            .flat_map(|j| (0..9).map(move |i| Point3::new(i as f64 * 0.025, j as f64 * 0.025, 0.0)))
            .collect()
    }

    #[test]
    fn seeded_solve_matches_unseeded() {
        let k = CameraIntrinsics::new(700.0, 700.0, 320.0, 240.0);
        let d = Distortion::zero();
        let gt = FrameExtrinsics::new(Vector3::new(0.2, 0.1, 0.05), Vector3::new(-0.1, -0.06, 0.5));
        let obj = grid();
        let img: Vec<_> = obj
            .iter()
            .map(|p| k.project(&d, &gt.transform(p)).unwrap())
            .collect();

        let solver = LinearSolver::default();
        let cold = solver.solve_pnp(&obj, &img, &k, &d, None).unwrap();
        let warm = solver.solve_pnp(&obj, &img, &k, &d, Some(&cold)).unwrap();
        assert!((cold.translation - gt.translation).norm() < 1e-6);
        assert!((warm.translation - gt.translation).norm() < 1e-6);
    }

    #[test]
    fn wild_seed_falls_back_to_linear_init() {
        let k = CameraIntrinsics::new(700.0, 700.0, 320.0, 240.0);
        let d = Distortion::zero();
        let gt = FrameExtrinsics::new(Vector3::new(-0.1, 0.3, 0.0), Vector3::new(-0.1, -0.06, 0.6));
        let obj = grid();
        let img: Vec<_> = obj
            .iter()
            .map(|p| k.project(&d, &gt.transform(p)).unwrap())
            .collect();

        // behind the camera: refinement cannot even evaluate the cost
        let bad = FrameExtrinsics::new(Vector3::zeros(), Vector3::new(0.0, 0.0, -1.0));
        let pose = LinearSolver::default()
            .solve_pnp(&obj, &img, &k, &d, Some(&bad))
            .unwrap();
        assert!((pose.translation - gt.translation).norm() < 1e-6);
    }

    #[test]
    fn mismatched_and_short_inputs_are_rejected() {
        let k = CameraIntrinsics::new(700.0, 700.0, 320.0, 240.0);
        let d = Distortion::zero();
        let obj = grid();
        let solver = LinearSolver::default();

        let img = vec![Point2::new(1.0, 2.0); 5];
        assert!(matches!(
            solver.solve_pnp(&obj, &img, &k, &d, None),
            Err(SolveError::MismatchedLengths { .. })
        ));
        assert!(matches!(
            solver.solve_pnp(&obj[..3], &img[..3], &k, &d, None),
            Err(SolveError::TooFewPoints { required: 4, got: 3 })
        ));
        assert!(matches!(
            solver.calibrate(&[], ImageSize::new(640, 480)),
            Err(SolveError::TooFewViews { .. })
        ));
    }
}
