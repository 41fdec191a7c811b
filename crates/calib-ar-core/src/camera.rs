//! Pinhole camera model, lens distortion and rigid pose types.
//!
//! Conventions follow the usual computer-vision frame: camera `x` right,
//! `y` down, `z` forward. A pose maps pattern (object) coordinates into the
//! camera frame: `X_cam = R * X_obj + t`.

use nalgebra::{
    Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector2, Vector3,
};
use serde::{Deserialize, Serialize};

/// Pixel dimensions of the video frames; fixed for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Point2<f64> {
        Point2::new(self.width as f64 * 0.5, self.height as f64 * 0.5)
    }
}

/// Pinhole intrinsics with zero skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// The 3x3 camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0
    }

    /// Pixel -> normalized image plane (no distortion handling).
    #[inline]
    pub fn normalize(&self, px: &Point2<f64>) -> Vector2<f64> {
        Vector2::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy)
    }

    /// Normalized image plane -> pixel.
    #[inline]
    pub fn denormalize(&self, n: &Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }

    /// Project a camera-frame point through the lens model. Returns `None`
    /// for points on or behind the camera plane.
    pub fn project(&self, distortion: &Distortion, p_cam: &Point3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= f64::EPSILON {
            return None;
        }
        let n = Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        Some(self.denormalize(&distortion.distort(&n)))
    }

    /// Pixel -> undistorted normalized coordinates.
    pub fn undistort_pixel(&self, distortion: &Distortion, px: &Point2<f64>) -> Vector2<f64> {
        distortion.undistort(&self.normalize(px))
    }
}

/// Brown-Conrady coefficients in OpenCV order: `[k1, k2, p1, p2, k3]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion(pub [f64; 5]);

impl Distortion {
    const UNDISTORT_ITERS: usize = 10;

    pub fn zero() -> Self {
        Self([0.0; 5])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|c| *c == 0.0)
    }

    pub fn coefficients(&self) -> &[f64; 5] {
        &self.0
    }

    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return *n;
        }
        let [k1, k2, p1, p2, k3] = self.0;
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
        let x_tan = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let y_tan = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Fixed-point inversion of [`Distortion::distort`].
    pub fn undistort(&self, n_dist: &Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return *n_dist;
        }
        let mut n = *n_dist;
        for _ in 0..Self::UNDISTORT_ITERS {
            let err = self.distort(&n) - n_dist;
            n -= err;
        }
        n
    }
}

/// Pose of the pattern in the camera frame for one image.
///
/// `rotation` is a Rodrigues (axis * angle) vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameExtrinsics {
    pub rotation: Vector3<f64>,
    pub translation: Vector3<f64>,
}

impl FrameExtrinsics {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Rodrigues exponential map of the rotation vector.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        Rotation3::new(self.rotation).into_inner()
    }

    pub fn from_rotation_matrix(r: &Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix(r);
        Self::new(rot.scaled_axis(), translation)
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self::new(iso.rotation.scaled_axis(), iso.translation.vector)
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::from(self.translation),
            UnitQuaternion::from_scaled_axis(self.rotation),
        )
    }

    /// Object -> camera frame.
    #[inline]
    pub fn transform(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation_matrix() * p.coords + self.translation)
    }

    pub fn is_finite(&self) -> bool {
        self.rotation
            .iter()
            .chain(self.translation.iter())
            .all(|v| v.is_finite())
    }
}

/// Result of a batch intrinsic solve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicModel {
    pub camera: CameraIntrinsics,
    pub distortion: Distortion,
    pub image_size: ImageSize,
    /// One pose per observation used in the fit, in observation order.
    pub views: Vec<FrameExtrinsics>,
    /// RMS reprojection error over every view, in pixels.
    pub rms_error: f64,
}
