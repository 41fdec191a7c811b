use approx::assert_relative_eq;
use calib_ar_core::{
    CameraIntrinsics, CameraSolver, Distortion, FrameExtrinsics, ImageSize, PatternSpec,
    ViewCorrespondences,
};
use calib_ar_linear::LinearSolver;
use nalgebra::{Point2, Vector3};

fn project(
    pattern: &PatternSpec,
    camera: &CameraIntrinsics,
    pose: &FrameExtrinsics,
) -> Vec<Point2<f64>> {
    pattern
        .object_points()
        .iter()
        .map(|p| {
            camera
                .project(&Distortion::zero(), &pose.transform(p))
                .expect("in front of camera")
        })
        .collect()
}

fn poses() -> Vec<FrameExtrinsics> {
    vec![
        FrameExtrinsics::new(Vector3::new(0.3, -0.1, 0.05), Vector3::new(-0.1, -0.06, 0.55)),
        FrameExtrinsics::new(Vector3::new(-0.2, 0.35, -0.1), Vector3::new(-0.08, -0.07, 0.6)),
        FrameExtrinsics::new(Vector3::new(0.15, 0.25, 0.2), Vector3::new(-0.12, -0.05, 0.5)),
        FrameExtrinsics::new(Vector3::new(-0.3, -0.2, 0.0), Vector3::new(-0.09, -0.04, 0.65)),
    ]
}

#[test]
fn full_calibration_recovers_camera_and_poses() {
    let pattern = PatternSpec::new(9, 6, 0.025).unwrap();
    let truth = CameraIntrinsics::new(820.0, 810.0, 318.0, 244.0);
    let images: Vec<_> = poses()
        .iter()
        .map(|pose| project(&pattern, &truth, pose))
        .collect();
    let views: Vec<_> = images
        .iter()
        .map(|img| ViewCorrespondences::new(pattern.object_points(), img))
        .collect();

    let model = LinearSolver::default()
        .calibrate(&views, ImageSize::new(640, 480))
        .expect("calibrate");

    assert_relative_eq!(model.camera.fx, truth.fx, epsilon = 1e-3);
    assert_relative_eq!(model.camera.fy, truth.fy, epsilon = 1e-3);
    assert_relative_eq!(model.camera.cx, truth.cx, epsilon = 1e-3);
    assert_relative_eq!(model.camera.cy, truth.cy, epsilon = 1e-3);
    assert!(model.rms_error < 1e-4, "rms {}", model.rms_error);
    assert_eq!(model.views.len(), 4);
    for (est, gt) in model.views.iter().zip(poses()) {
        assert_relative_eq!(est.translation, gt.translation, epsilon = 1e-5);
    }
    assert!(model.distortion.is_zero());
}

#[test]
fn single_view_uses_the_reduced_model() {
    let pattern = PatternSpec::new(9, 6, 0.025).unwrap();
    let truth = CameraIntrinsics::new(700.0, 700.0, 320.0, 240.0);
    let img = project(&pattern, &truth, &poses()[0]);
    let views = [ViewCorrespondences::new(pattern.object_points(), &img)];

    let model = LinearSolver::default()
        .calibrate(&views, ImageSize::new(640, 480))
        .expect("calibrate");

    assert_relative_eq!(model.camera.fx, 700.0, epsilon = 1e-4);
    assert_eq!(model.camera.fx, model.camera.fy);
    assert_eq!((model.camera.cx, model.camera.cy), (320.0, 240.0));
}
