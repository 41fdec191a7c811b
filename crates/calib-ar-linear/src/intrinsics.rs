//! Closed-form intrinsics from plane homographies.
//!
//! Homographies are first conditioned with `N = [1/s 0 -cx0/s; 0 1/s -cy0/s; 0 0 1]`
//! (`s` = larger image side, `(cx0, cy0)` = image centre) so every entry of
//! Zhang's constraint matrix lives on a similar scale. Intrinsics recovered
//! in the conditioned frame are mapped back with `K = N^{-1} K'`.

use calib_ar_core::{CameraIntrinsics, ImageSize, SolveError};
use nalgebra::{DMatrix, Matrix3, SVector};

/// Minimum number of views for the full (fx, fy, cx, cy) solve.
pub const MIN_VIEWS_FULL: usize = 3;

fn conditioning(size: ImageSize) -> (Matrix3<f64>, f64, f64, f64) {
    let s = (size.width.max(size.height) as f64).max(1.0);
    let c = size.center();
    let n = Matrix3::new(
        1.0 / s, 0.0, -c.x / s, //
        0.0, 1.0 / s, -c.y / s, //
        0.0, 0.0, 1.0,
    );
    (n, s, c.x, c.y)
}

fn conditioned(hmtxs: &[Matrix3<f64>], n: &Matrix3<f64>) -> Vec<Matrix3<f64>> {
    hmtxs
        .iter()
        .map(|h| {
            let hc = n * h;
            let norm = hc.norm();
            if norm > 0.0 {
                hc / norm
            } else {
                hc
            }
        })
        .collect()
}

/// Zhang's 6-vector `v_ij(H)`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Full pinhole solve (Zhang) with the zero-skew constraint `B12 = 0`
/// appended. Needs [`MIN_VIEWS_FULL`] homographies.
pub fn zhang_intrinsics(
    hmtxs: &[Matrix3<f64>],
    size: ImageSize,
) -> Result<CameraIntrinsics, SolveError> {
    if hmtxs.len() < MIN_VIEWS_FULL {
        return Err(SolveError::TooFewViews {
            required: MIN_VIEWS_FULL,
            got: hmtxs.len(),
        });
    }

    let (n, s, cx0, cy0) = conditioning(size);
    let hs = conditioned(hmtxs, &n);

    let mut vmtx = DMatrix::<f64>::zeros(2 * hs.len() + 1, 6);
    for (k, h) in hs.iter().enumerate() {
        let v12 = v_ij(h, 0, 1);
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }
    vmtx[(2 * hs.len(), 1)] = 1.0;

    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(SolveError::Degenerate("svd of Zhang system failed"))?;
    let b = v_t.row(v_t.nrows() - 1);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm < 1e-9 {
        return Err(SolveError::Degenerate(
            "views do not constrain the focal lengths",
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let fx2 = lambda / b11;
    let fy2 = lambda * b11 / denom;
    if fx2 <= 0.0 || fy2 <= 0.0 {
        return Err(SolveError::Degenerate(
            "image of the absolute conic is not positive definite",
        ));
    }

    let alpha = fx2.sqrt();
    let beta = fy2.sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    finish(CameraIntrinsics::new(alpha, beta, u0, v0), s, cx0, cy0)
}

/// Reduced solve for one or two views: principal point at the image centre,
/// square pixels, one focal length fitted in least squares.
pub fn focal_only_intrinsics(
    hmtxs: &[Matrix3<f64>],
    size: ImageSize,
) -> Result<CameraIntrinsics, SolveError> {
    if hmtxs.is_empty() {
        return Err(SolveError::TooFewViews {
            required: 1,
            got: 0,
        });
    }

    let (n, s, cx0, cy0) = conditioning(size);
    let hs = conditioned(hmtxs, &n);

    // Per view: a * w + c = 0 with w = 1 / f^2 (in conditioned units).
    let mut aa = 0.0;
    let mut ac = 0.0;
    for h in &hs {
        let rows = [
            (
                h[(0, 0)] * h[(0, 1)] + h[(1, 0)] * h[(1, 1)],
                h[(2, 0)] * h[(2, 1)],
            ),
            (
                h[(0, 0)].powi(2) + h[(1, 0)].powi(2) - h[(0, 1)].powi(2) - h[(1, 1)].powi(2),
                h[(2, 0)].powi(2) - h[(2, 1)].powi(2),
            ),
        ];
        for (a, c) in rows {
            aa += a * a;
            ac += a * c;
        }
    }

    if aa < 1e-18 {
        return Err(SolveError::Degenerate("views do not constrain the focal length"));
    }
    let w = -ac / aa;
    if w <= 1e-12 {
        return Err(SolveError::Degenerate(
            "fronto-parallel views cannot constrain the focal length",
        ));
    }
    let f = 1.0 / w.sqrt();

    finish(CameraIntrinsics::new(f, f, 0.0, 0.0), s, cx0, cy0)
}

fn finish(
    conditioned: CameraIntrinsics,
    s: f64,
    cx0: f64,
    cy0: f64,
) -> Result<CameraIntrinsics, SolveError> {
    let k = CameraIntrinsics::new(
        conditioned.fx * s,
        conditioned.fy * s,
        conditioned.cx * s + cx0,
        conditioned.cy * s + cy0,
    );
    if !k.is_valid() {
        return Err(SolveError::NonFinite);
    }
    Ok(k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn kmtx() -> Matrix3<f64> {
        CameraIntrinsics::new(900.0, 880.0, 330.0, 250.0).matrix()
    }

    fn synthetic_homography(
        k: &Matrix3<f64>,
        rot: Rotation3<f64>,
        t: Vector3<f64>,
    ) -> Matrix3<f64> {
        let r = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h
    }

    fn views(k: &Matrix3<f64>) -> Vec<Matrix3<f64>> {
        vec![
            synthetic_homography(
                k,
                Rotation3::from_euler_angles(0.3, 0.0, 0.05),
                Vector3::new(-0.1, -0.05, 0.6),
            ),
            synthetic_homography(
                k,
                Rotation3::from_euler_angles(-0.1, 0.35, -0.1),
                Vector3::new(-0.05, -0.1, 0.7),
            ),
            synthetic_homography(
                k,
                Rotation3::from_euler_angles(0.2, -0.3, 0.2),
                Vector3::new(-0.08, -0.06, 0.55),
            ),
        ]
    }

    #[test]
    fn zhang_recovers_intrinsics() {
        let k = kmtx();
        let est = zhang_intrinsics(&views(&k), ImageSize::new(640, 480)).expect("solve");
        assert!((est.fx - 900.0).abs() < 1e-3, "fx {}", est.fx);
        assert!((est.fy - 880.0).abs() < 1e-3, "fy {}", est.fy);
        assert!((est.cx - 330.0).abs() < 1e-3, "cx {}", est.cx);
        assert!((est.cy - 250.0).abs() < 1e-3, "cy {}", est.cy);
    }

    #[test]
    fn zhang_needs_three_views() {
        let k = kmtx();
        let err = zhang_intrinsics(&views(&k)[..2], ImageSize::new(640, 480)).unwrap_err();
        assert_eq!(err, SolveError::TooFewViews { required: 3, got: 2 });
    }

    #[test]
    fn focal_only_recovers_square_pixel_camera() {
        let k = CameraIntrinsics::new(750.0, 750.0, 320.0, 240.0).matrix();
        let h = synthetic_homography(
            &k,
            Rotation3::from_euler_angles(0.35, -0.25, 0.1),
            Vector3::new(-0.1, -0.05, 0.8),
        );
        let est = focal_only_intrinsics(&[h], ImageSize::new(640, 480)).expect("solve");
        assert!((est.fx - 750.0).abs() < 1e-6, "f {}", est.fx);
        assert_eq!(est.fx, est.fy);
        assert_eq!((est.cx, est.cy), (320.0, 240.0));
    }

    #[test]
    fn fronto_parallel_view_is_degenerate() {
        let k = CameraIntrinsics::new(750.0, 750.0, 320.0, 240.0).matrix();
        let h = synthetic_homography(&k, Rotation3::identity(), Vector3::new(0.0, 0.0, 1.0));
        assert!(matches!(
            focal_only_intrinsics(&[h], ImageSize::new(640, 480)),
            Err(SolveError::Degenerate(_))
        ));
    }
}
