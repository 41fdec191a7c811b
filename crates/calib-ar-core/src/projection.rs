//! Conversion of calibration results into OpenGL-style render matrices.
//!
//! The renderer works in GL eye space (x right, y up, looking down -z) and
//! clips against NDC `[-1, 1]^3`. Two matrices bridge the gap:
//!
//! - [`gl_projection`]: perspective projection derived from the pinhole
//!   intrinsics and the frame size, so that a point projecting to pixel
//!   `(u, v)` lands on the same place of the video texture after the w-divide.
//! - [`gl_model`]: pattern -> eye transform, `C * [R | t] * diag(s, s, s, 1)`
//!   with `C = diag(1, -1, -1, 1)` flipping the camera's y-down/z-forward axes.
//!
//! Both are returned as `f64` matrices; [`to_gl_array`] produces the
//! column-major `[f32; 16]` layout a shader uniform expects.

use crate::camera::{CameraIntrinsics, FrameExtrinsics, ImageSize};
use nalgebra::{Matrix3, Matrix4, Point3, Vector4};
use serde::{Deserialize, Serialize};

/// Near/far clip distances, in pattern units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipPlanes {
    pub znear: f64,
    pub zfar: f64,
}

impl Default for ClipPlanes {
    fn default() -> Self {
        Self {
            znear: 0.01,
            zfar: 200.0,
        }
    }
}

impl ClipPlanes {
    pub fn is_valid(&self) -> bool {
        self.znear > 0.0 && self.zfar > self.znear && self.zfar.is_finite()
    }
}

/// Perspective projection matching the camera intrinsics.
///
/// A camera-frame point at depth `d` on the ray of pixel `(u, v)` maps to
/// NDC `(2u/w - 1, 1 - 2v/h, z)` with `z = -1` at `d = znear` and `z = 1`
/// at `d = zfar`.
pub fn gl_projection(
    camera: &CameraIntrinsics,
    size: ImageSize,
    clip: ClipPlanes,
) -> Matrix4<f64> {
    let w = size.width as f64;
    let h = size.height as f64;
    let (n, f) = (clip.znear, clip.zfar);

    Matrix4::new(
        2.0 * camera.fx / w,
        0.0,
        1.0 - 2.0 * camera.cx / w,
        0.0,
        //
        0.0,
        2.0 * camera.fy / h,
        2.0 * camera.cy / h - 1.0,
        0.0,
        //
        0.0,
        0.0,
        -(f + n) / (f - n),
        -2.0 * f * n / (f - n),
        //
        0.0,
        0.0,
        -1.0,
        0.0,
    )
}

/// Pattern -> GL eye transform for the given pose, scaling pattern-space
/// geometry by `scale` first.
///
/// The result is `C * [R | t] * S` with `C = diag(1, -1, -1)`. The
/// translation is not negated: `[R | -R t]` style matrices map the other way
/// (camera to pattern) and do not compose with [`gl_projection`].
pub fn gl_model(extrinsics: &FrameExtrinsics, scale: f64) -> Matrix4<f64> {
    let flip = Matrix3::from_diagonal(&nalgebra::Vector3::new(1.0, -1.0, -1.0));
    let r = flip * extrinsics.rotation_matrix() * scale;
    let t = flip * extrinsics.translation;

    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(&r);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
    m
}

/// Column-major `f32` copy, ready for a uniform upload.
pub fn to_gl_array(m: &Matrix4<f64>) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for (dst, src) in out.iter_mut().zip(m.as_slice()) {
        *dst = *src as f32;
    }
    out
}

/// Clip-space coordinates of a pattern point: `P * M * (x, y, z, 1)`.
pub fn clip_coords(
    projection: &Matrix4<f64>,
    model: &Matrix4<f64>,
    p: &Point3<f64>,
) -> Vector4<f64> {
    projection * model * p.to_homogeneous()
}

/// NDC position after the w-divide, `None` when `w` vanishes.
pub fn ndc_coords(clip: &Vector4<f64>) -> Option<Point3<f64>> {
    if clip.w.abs() < 1e-12 {
        return None;
    }
    Some(Point3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w))
}
