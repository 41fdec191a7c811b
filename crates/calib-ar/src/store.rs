//! Calibration samples: detected corners paired with the pattern geometry.
//!
//! On disk a sample set is a directory of `calib0.png`, `calib1.png`, ...
//! Loading stops at the first missing index, so the numbering has to be
//! contiguous.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use calib_ar_core::{PatternSpec, ViewCorrespondences};
use image::{ImageFormat, RgbImage};
use log::{debug, info, warn};
use nalgebra::{Point2, Point3};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::detect::{detect_in_frame, PatternDetector};
use crate::draw::annotate;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("calibration directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("image error on {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

fn image_error(path: &Path, err: image::ImageError) -> StoreError {
    match err {
        image::ImageError::IoError(source) => StoreError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => StoreError::Image {
            path: path.to_path_buf(),
            source,
        },
    }
}

/// File name of the `index`-th stored sample.
pub fn sample_file_name(index: usize) -> String {
    format!("calib{index}.png")
}

/// One calibration sample.
#[derive(Clone, Debug)]
pub struct Observation {
    image_points: Vec<Point2<f64>>,
    object_points: Arc<[Point3<f64>]>,
    source_image: Option<RgbImage>,
    name: Option<String>,
}

impl Observation {
    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image_points
    }

    pub fn object_points(&self) -> &[Point3<f64>] {
        &self.object_points
    }

    /// The frame the corners were found in, kept for display.
    pub fn source_image(&self) -> Option<&RgbImage> {
        self.source_image.as_ref()
    }

    /// File name the sample was loaded from or saved to, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn correspondences(&self) -> ViewCorrespondences<'_> {
        ViewCorrespondences::new(&self.object_points, &self.image_points)
    }
}

/// Result of running the detector on one frame.
#[derive(Clone, Debug, Default)]
pub struct Detection {
    pub corners: Option<Vec<Point2<f64>>>,
    /// Annotated copy of the frame, when an overlay was requested.
    pub overlay: Option<RgbImage>,
}

impl Detection {
    pub fn found(&self) -> bool {
        self.corners.is_some()
    }
}

/// Outcome of [`ObservationStore::capture_and_store`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capture {
    pub path: PathBuf,
    pub added: bool,
}

/// Ordered set of [`Observation`]s for one pattern.
pub struct ObservationStore<D> {
    pattern: PatternSpec,
    detector: D,
    observations: Vec<Observation>,
}

impl<D: PatternDetector> ObservationStore<D> {
    pub fn new(pattern: PatternSpec, detector: D) -> Self {
        Self {
            pattern,
            detector,
            observations: Vec::new(),
        }
    }

    pub fn pattern(&self) -> &PatternSpec {
        &self.pattern
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn clear(&mut self) {
        self.observations.clear();
    }

    /// Borrowed correspondences of every sample, in insertion order.
    pub fn views(&self) -> Vec<ViewCorrespondences<'_>> {
        self.observations
            .iter()
            .map(Observation::correspondences)
            .collect()
    }

    /// Look for the pattern in `frame`. The overlay never influences the
    /// returned corners.
    pub fn try_detect(&self, frame: &RgbImage, draw_overlay: bool) -> Detection {
        let corners = detect_in_frame(&self.detector, frame, &self.pattern);
        let overlay = draw_overlay.then(|| annotate(frame, &self.pattern, corners.as_deref()));
        Detection { corners, overlay }
    }

    fn make_observation(
        &self,
        frame: &RgbImage,
        corners: Vec<Point2<f64>>,
        name: Option<String>,
    ) -> Observation {
        Observation {
            image_points: corners,
            object_points: self.pattern.shared_object_points(),
            source_image: Some(frame.clone()),
            name,
        }
    }

    /// Append a sample built from an earlier detection on `frame`.
    pub fn push_detection(&mut self, frame: &RgbImage, corners: Vec<Point2<f64>>) {
        let obs = self.make_observation(frame, corners, None);
        self.observations.push(obs);
    }

    /// Detect and, when `add` is set and the pattern was found, append a
    /// sample. Returns whether a sample was added.
    pub fn record_if_detected(&mut self, frame: &RgbImage, add: bool) -> bool {
        if !add {
            return false;
        }
        match detect_in_frame(&self.detector, frame, &self.pattern) {
            Some(corners) => {
                self.push_detection(frame, corners);
                true
            }
            None => false,
        }
    }

    /// Replace the samples with those found in `dir/calib{N}.png`,
    /// N = 0, 1, ... up to the first missing file. Images without a
    /// detectable pattern are skipped. On error the store is unchanged.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, dir), fields(dir = %dir.as_ref().display()))
    )]
    pub fn load_from_directory(&mut self, dir: impl AsRef<Path>) -> Result<usize, StoreError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(StoreError::MissingDirectory(dir.to_path_buf()));
        }

        let mut loaded = Vec::new();
        for index in 0.. {
            let name = sample_file_name(index);
            let path = dir.join(&name);
            if !path.is_file() {
                debug!("{} not found, stopping after {index} file(s)", path.display());
                break;
            }
            let frame = image::open(&path)
                .map_err(|err| image_error(&path, err))?
                .to_rgb8();

            match detect_in_frame(&self.detector, &frame, &self.pattern) {
                Some(corners) => {
                    info!("loaded {name}");
                    loaded.push(self.make_observation(&frame, corners, Some(name)));
                }
                None => warn!("no pattern found in {name}, skipping"),
            }
        }

        self.observations = loaded;
        Ok(self.observations.len())
    }

    /// Save `frame` as `dir/calib{len}.png`, then record it like
    /// [`Self::record_if_detected`] with `add = true`.
    ///
    /// A frame without a detectable pattern is still written but not
    /// counted, so the next capture reuses its index and the numbering
    /// stays contiguous.
    pub fn capture_and_store(
        &mut self,
        dir: impl AsRef<Path>,
        frame: &RgbImage,
    ) -> Result<Capture, StoreError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(StoreError::MissingDirectory(dir.to_path_buf()));
        }
        let name = sample_file_name(self.len());
        let path = dir.join(&name);
        frame
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|err| image_error(&path, err))?;
        info!("saved {}", path.display());

        let added = match detect_in_frame(&self.detector, frame, &self.pattern) {
            Some(corners) => {
                let obs = self.make_observation(frame, corners, Some(name));
                self.observations.push(obs);
                true
            }
            None => {
                warn!("no pattern found in captured frame {name}");
                false
            }
        };
        Ok(Capture { path, added })
    }
}
