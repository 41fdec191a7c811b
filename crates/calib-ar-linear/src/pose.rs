//! Planar pose estimation: homography decomposition plus a small
//! Gauss-Newton refinement of the reprojection error.

use calib_ar_core::{
    estimate_homography, reprojection_sq_sum, CameraIntrinsics, Distortion, FrameExtrinsics,
    SolveError,
};
use nalgebra::{Matrix3, Matrix6, Point2, Point3, SMatrix, Vector3, Vector6};

/// Ratio of the smaller to the larger principal spread below which a point
/// set is treated as collinear.
const COLLINEAR_RATIO: f64 = 1e-6;

/// Tolerance on |z| for object points to count as planar.
const PLANAR_EPS: f64 = 1e-9;

/// Reject point sets that cannot pin down a homography: coincident or
/// collinear points.
pub fn check_spread(points: impl Iterator<Item = (f64, f64)>) -> Result<(), SolveError> {
    let pts: Vec<(f64, f64)> = points.collect();
    let n = pts.len() as f64;
    if pts.is_empty() {
        return Err(SolveError::TooFewPoints {
            required: 4,
            got: 0,
        });
    }
    let (mx, my) = pts
        .iter()
        .fold((0.0, 0.0), |(x, y), p| (x + p.0 / n, y + p.1 / n));
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pts {
        let (dx, dy) = (x - mx, y - my);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    // eigenvalues of the 2x2 scatter matrix
    let tr = sxx + syy;
    let disc = ((sxx - syy).powi(2) + 4.0 * sxy * sxy).sqrt();
    let l_max = 0.5 * (tr + disc);
    let l_min = 0.5 * (tr - disc);
    if !l_max.is_finite() || l_max <= f64::EPSILON {
        return Err(SolveError::Degenerate("coincident points"));
    }
    if l_min / l_max < COLLINEAR_RATIO {
        return Err(SolveError::Degenerate("collinear points"));
    }
    Ok(())
}

/// Decompose a plane-to-normalized-image homography (`K = I`) into the pose
/// of the `Z = 0` plane. The camera is kept in front of the plane.
pub fn pose_from_homography(h: &Matrix3<f64>) -> Result<FrameExtrinsics, SolveError> {
    let m1 = h.column(0).into_owned();
    let m2 = h.column(1).into_owned();
    let m3 = h.column(2).into_owned();

    let norm = 0.5 * (m1.norm() + m2.norm());
    if norm <= f64::EPSILON {
        return Err(SolveError::Degenerate("homography has no rotation part"));
    }
    let mut lambda = 1.0 / norm;
    if lambda * m3.z < 0.0 {
        lambda = -lambda;
    }

    let r1 = m1 * lambda;
    let r2 = m2 * lambda;
    let r3 = r1.cross(&r2);
    let r_approx = Matrix3::from_columns(&[r1, r2, r3]);

    // closest rotation (polar decomposition)
    let svd = r_approx.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => return Err(SolveError::Degenerate("svd of rotation estimate failed")),
    };
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }

    let pose = FrameExtrinsics::from_rotation_matrix(&r, m3 * lambda);
    if !pose.is_finite() {
        return Err(SolveError::NonFinite);
    }
    Ok(pose)
}

/// Linear planar PnP: undistort, fit the homography in normalized
/// coordinates, decompose.
pub fn planar_pose(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    camera: &CameraIntrinsics,
    distortion: &Distortion,
) -> Result<FrameExtrinsics, SolveError> {
    if object_points.iter().any(|p| p.z.abs() > PLANAR_EPS) {
        return Err(SolveError::Degenerate("object points must lie on Z = 0"));
    }

    let src: Vec<Point2<f64>> = object_points
        .iter()
        .map(|p| Point2::new(p.x, p.y))
        .collect();
    let dst: Vec<Point2<f64>> = image_points
        .iter()
        .map(|px| Point2::from(camera.undistort_pixel(distortion, px)))
        .collect();

    let h = estimate_homography(&src, &dst)
        .ok_or(SolveError::Degenerate("homography fit failed"))?;
    pose_from_homography(&h.h)
}

/// Outcome of [`refine_pose`].
#[derive(Clone, Copy, Debug)]
pub struct Refined {
    pub pose: FrameExtrinsics,
    /// RMS reprojection error in pixels (`INFINITY` if the pose puts points
    /// behind the camera).
    pub rms: f64,
    pub iterations: usize,
}

fn cost(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    camera: &CameraIntrinsics,
    distortion: &Distortion,
    params: &Vector6<f64>,
) -> f64 {
    let pose = to_pose(params);
    reprojection_sq_sum(object_points, image_points, camera, distortion, &pose)
        .map(|(sum, _)| sum)
        .filter(|s| s.is_finite())
        .unwrap_or(f64::INFINITY)
}

fn to_params(pose: &FrameExtrinsics) -> Vector6<f64> {
    Vector6::new(
        pose.rotation.x,
        pose.rotation.y,
        pose.rotation.z,
        pose.translation.x,
        pose.translation.y,
        pose.translation.z,
    )
}

fn to_pose(p: &Vector6<f64>) -> FrameExtrinsics {
    FrameExtrinsics::new(Vector3::new(p[0], p[1], p[2]), Vector3::new(p[3], p[4], p[5]))
}

fn residual_row(
    camera: &CameraIntrinsics,
    distortion: &Distortion,
    pose: &FrameExtrinsics,
    obj: &Point3<f64>,
) -> Option<Point2<f64>> {
    camera.project(distortion, &pose.transform(obj))
}

/// Gauss-Newton on the 6-dof pose with central-difference Jacobians and a
/// halving line search. Never returns a pose with a higher cost than `start`.
pub fn refine_pose(
    object_points: &[Point3<f64>],
    image_points: &[Point2<f64>],
    camera: &CameraIntrinsics,
    distortion: &Distortion,
    start: &FrameExtrinsics,
    max_iterations: usize,
) -> Refined {
    const STEP: f64 = 1e-6;
    let n = object_points.len().min(image_points.len());

    let mut params = to_params(start);
    let mut current = cost(object_points, image_points, camera, distortion, &params);
    let mut iterations = 0;

    while iterations < max_iterations && current.is_finite() && n > 0 {
        iterations += 1;

        let mut jtj = Matrix6::<f64>::zeros();
        let mut jtr = Vector6::<f64>::zeros();
        let pose = to_pose(&params);
        let mut ok = true;

        for (obj, img) in object_points.iter().zip(image_points).take(n) {
            let Some(px) = residual_row(camera, distortion, &pose, obj) else {
                ok = false;
                break;
            };
            let r = px - *img;

            let mut jac = SMatrix::<f64, 2, 6>::zeros();
            for k in 0..6 {
                let mut plus = params;
                let mut minus = params;
                plus[k] += STEP;
                minus[k] -= STEP;
                let (Some(a), Some(b)) = (
                    residual_row(camera, distortion, &to_pose(&plus), obj),
                    residual_row(camera, distortion, &to_pose(&minus), obj),
                ) else {
                    ok = false;
                    break;
                };
                jac.set_column(k, &((a - b) / (2.0 * STEP)));
            }
            if !ok {
                break;
            }
            jtj += jac.transpose() * jac;
            jtr += jac.transpose() * r;
        }
        if !ok {
            break;
        }

        let Some(delta) = jtj.cholesky().map(|c| c.solve(&(-jtr))) else {
            break;
        };

        let mut accepted = false;
        let mut scale = 1.0;
        for _ in 0..8 {
            let candidate = params + delta * scale;
            let c = cost(object_points, image_points, camera, distortion, &candidate);
            if c < current {
                params = candidate;
                current = c;
                accepted = true;
                break;
            }
            scale *= 0.5;
        }

        if !accepted || delta.norm() * scale < 1e-12 {
            break;
        }
    }

    let rms = if n > 0 && current.is_finite() {
        (current / n as f64).sqrt()
    } else {
        f64::INFINITY
    };
    Refined {
        pose: to_pose(&params),
        rms,
        iterations,
    }
}
