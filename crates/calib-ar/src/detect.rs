//! The corner detector seam.

use calib_ar_core::PatternSpec;
use image::{GrayImage, RgbImage};
use nalgebra::Point2;

/// Finds the inner corners of a chessboard in a grayscale frame.
///
/// On success the returned points must follow [`PatternSpec::object_points`]
/// order: row-major, column index varying fastest, exactly
/// [`PatternSpec::corner_count`] entries. Anything else is treated as
/// "pattern not found".
pub trait PatternDetector {
    fn detect(&self, image: &GrayImage, pattern: &PatternSpec) -> Option<Vec<Point2<f64>>>;
}

impl<F> PatternDetector for F
where
    F: Fn(&GrayImage, &PatternSpec) -> Option<Vec<Point2<f64>>>,
{
    fn detect(&self, image: &GrayImage, pattern: &PatternSpec) -> Option<Vec<Point2<f64>>> {
        self(image, pattern)
    }
}

/// Run `detector` on an RGB frame and enforce the corner-count contract.
pub fn detect_in_frame<D: PatternDetector + ?Sized>(
    detector: &D,
    frame: &RgbImage,
    pattern: &PatternSpec,
) -> Option<Vec<Point2<f64>>> {
    let gray = image::imageops::grayscale(frame);
    let corners = detector.detect(&gray, pattern)?;
    if corners.len() != pattern.corner_count() {
        log::warn!(
            "detector returned {} corners for a {}x{} pattern, ignoring",
            corners.len(),
            pattern.columns(),
            pattern.rows()
        );
        return None;
    }
    if corners.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        log::warn!("detector returned non-finite corners, ignoring");
        return None;
    }
    Some(corners)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_corner_count_counts_as_not_found() {
        let pattern = PatternSpec::new(3, 2, 1.0).unwrap();
        let frame = RgbImage::new(8, 8);

        let short = |_: &GrayImage, _: &PatternSpec| Some(vec![Point2::new(1.0, 1.0); 5]);
        assert!(detect_in_frame(&short, &frame, &pattern).is_none());

        let exact = |_: &GrayImage, p: &PatternSpec| {
            Some(vec![Point2::new(1.0, 1.0); p.corner_count()])
        };
        assert_eq!(detect_in_frame(&exact, &frame, &pattern).map(|c| c.len()), Some(6));
    }

    #[test]
    fn boxed_and_trait_object_detectors_work() {
        let pattern = PatternSpec::new(2, 2, 1.0).unwrap();
        let frame = RgbImage::new(8, 8);

        let boxed: Box<dyn Fn(&GrayImage, &PatternSpec) -> Option<Vec<Point2<f64>>>> =
            Box::new(|_: &GrayImage, p: &PatternSpec| {
                Some(vec![Point2::new(2.0, 3.0); p.corner_count()])
            });
        assert_eq!(detect_in_frame(&boxed, &frame, &pattern).map(|c| c.len()), Some(4));

        let object: &dyn PatternDetector = &boxed;
        assert_eq!(detect_in_frame(object, &frame, &pattern).map(|c| c.len()), Some(4));
    }
}
