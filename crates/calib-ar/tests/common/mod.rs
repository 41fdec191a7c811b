#![allow(dead_code)]

//! Deterministic stand-in for a chessboard detector.
//!
//! A frame "contains" the pattern when pixel (0, 0) is bright; pixel (1, 0)
//! encodes which synthetic view it is. The detector answers with the exact
//! projection of the pattern under that view's pose.

use calib_ar::{CalibrationEngine, LinearSolver, PatternSpec};
use calib_ar_core::{CameraIntrinsics, Distortion, FrameExtrinsics};
use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::{Point2, Vector3};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 480;

const MARKER: u8 = 250;
const VIEW_STEP: u8 = 20;

pub type FakeDetector = fn(&GrayImage, &PatternSpec) -> Option<Vec<Point2<f64>>>;
pub type FakeEngine = CalibrationEngine<FakeDetector, LinearSolver>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn pattern() -> PatternSpec {
    PatternSpec::new(9, 6, 0.025).expect("pattern")
}

pub fn truth() -> CameraIntrinsics {
    CameraIntrinsics::new(800.0, 790.0, 322.0, 238.0)
}

pub fn poses() -> Vec<FrameExtrinsics> {
    vec![
        FrameExtrinsics::new(Vector3::new(0.3, -0.1, 0.05), Vector3::new(-0.1, -0.06, 0.5)),
        FrameExtrinsics::new(Vector3::new(-0.25, 0.3, -0.1), Vector3::new(-0.09, -0.07, 0.55)),
        FrameExtrinsics::new(Vector3::new(0.15, 0.25, 0.2), Vector3::new(-0.12, -0.05, 0.48)),
        FrameExtrinsics::new(Vector3::new(-0.3, -0.2, 0.0), Vector3::new(-0.08, -0.04, 0.6)),
        FrameExtrinsics::new(Vector3::new(0.05, 0.35, -0.15), Vector3::new(-0.1, -0.06, 0.52)),
    ]
}

pub fn project(view: usize) -> Vec<Point2<f64>> {
    let pose = poses()[view];
    pattern()
        .object_points()
        .iter()
        .map(|p| {
            truth()
                .project(&Distortion::zero(), &pose.transform(p))
                .expect("pattern in front of the camera")
        })
        .collect()
}

/// A frame showing synthetic view `view`, or no pattern for `None`.
pub fn frame(view: Option<usize>) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([40, 40, 40]));
    if let Some(v) = view {
        img.put_pixel(0, 0, Rgb([MARKER; 3]));
        let code = VIEW_STEP * v as u8 + VIEW_STEP / 2;
        img.put_pixel(1, 0, Rgb([code; 3]));
    }
    img
}

pub fn fake_detector(img: &GrayImage, pattern: &PatternSpec) -> Option<Vec<Point2<f64>>> {
    let Luma([marker]) = *img.get_pixel(0, 0);
    if marker != MARKER {
        return None;
    }
    let Luma([code]) = *img.get_pixel(1, 0);
    let view = (code / VIEW_STEP) as usize;
    if view >= poses().len() || pattern.corner_count() != 54 {
        return None;
    }
    Some(project(view))
}

pub fn engine() -> FakeEngine {
    CalibrationEngine::new(
        pattern(),
        fake_detector as FakeDetector,
        LinearSolver::default(),
    )
}
