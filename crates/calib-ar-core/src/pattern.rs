//! Physical geometry of the planar chessboard target.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Errors raised when building a [`PatternSpec`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error(
        "invalid pattern: {columns}x{rows} inner corners with square size {square_size} \
         (need at least 2x2 corners and a positive square size)"
    )]
    InvalidPatternKind {
        columns: usize,
        rows: usize,
        square_size: f64,
    },
}

/// Plain-data description of a chessboard pattern, as it appears in configs.
///
/// `columns` and `rows` count *inner* corners (squares - 1).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub columns: usize,
    pub rows: usize,
    /// Side of one square in physical units (the unit of every pose translation).
    pub square_size: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            columns: 9,
            rows: 6,
            square_size: 0.025,
        }
    }
}

/// Validated chessboard geometry with its object-space corner grid.
///
/// Object points lie on `Z = 0`, row-major with the column index varying
/// fastest: the point at row `j`, column `i` is
/// `(i * square_size, j * square_size, 0)` and sits at index `i + j * columns`.
/// Detectors must report image corners in the same order.
#[derive(Clone, Debug, PartialEq)]
pub struct PatternSpec {
    columns: usize,
    rows: usize,
    square_size: f64,
    object_points: Arc<[Point3<f64>]>,
}

impl PatternSpec {
    pub fn new(columns: usize, rows: usize, square_size: f64) -> Result<Self, PatternError> {
        if columns < 2 || rows < 2 || square_size <= 0.0 || !square_size.is_finite() {
            return Err(PatternError::InvalidPatternKind {
                columns,
                rows,
                square_size,
            });
        }

        let mut points = Vec::with_capacity(columns * rows);
        for j in 0..rows {
            for i in 0..columns {
                points.push(Point3::new(
                    i as f64 * square_size,
                    j as f64 * square_size,
                    0.0,
                ));
            }
        }

        Ok(Self {
            columns,
            rows,
            square_size,
            object_points: points.into(),
        })
    }

    pub fn from_config(cfg: &PatternConfig) -> Result<Self, PatternError> {
        Self::new(cfg.columns, cfg.rows, cfg.square_size)
    }

    pub fn config(&self) -> PatternConfig {
        PatternConfig {
            columns: self.columns,
            rows: self.rows,
            square_size: self.square_size,
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    /// Number of inner corners, `columns * rows`.
    pub fn corner_count(&self) -> usize {
        self.object_points.len()
    }

    pub fn object_points(&self) -> &[Point3<f64>] {
        &self.object_points
    }

    /// Shared handle to the object points; observations keep one of these
    /// instead of a private copy.
    pub fn shared_object_points(&self) -> Arc<[Point3<f64>]> {
        Arc::clone(&self.object_points)
    }

    /// Index of the corner at `(column, row)`, if inside the grid.
    pub fn index_of(&self, column: usize, row: usize) -> Option<usize> {
        (column < self.columns && row < self.rows).then(|| column + row * self.columns)
    }
}
