use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Plane-to-image projective map, `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: &Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    // translate to centroid, scale so mean distance = sqrt(2)
    let n = pts.len() as f64;
    let (sx, sy) = pts.iter().fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
    let (cx, cy) = (sx / n, sy / n);

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

/// Estimate `H` such that `dst ~ H * src` with the normalized DLT.
///
/// Needs at least four correspondences; returns `None` on mismatched
/// inputs or a numerically singular fit.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip(src, dst), fields(points = src.len()))
)]
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    let (s, ts) = normalize_points(src);
    let (d, td) = normalize_points(dst);

    // Pad to a square system when n = 4 so the thin SVD still exposes the
    // null vector as the last row of V^T.
    let n = src.len();
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);

    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let vt = svd.v_t?;
    let h = vt.row(vt.nrows().checked_sub(1)?);
    let hn = Matrix3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    // H = Td^{-1} * Hn * Ts
    let h_den = td.try_inverse()? * hn * ts;
    let scale = h_den[(2, 2)];
    if scale.abs() < 1e-12 || !h_den.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Homography::new(h_den / scale))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ground_truth() -> Homography {
        Homography::new(Matrix3::new(
            780.0, 25.0, 310.0, //
            -12.0, 760.0, 245.0, //
            0.05, 0.08, 1.0,
        ))
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = ground_truth();
        let inv = h.inverse().expect("invertible");
        for p in [Point2::new(0.0, 0.0), Point2::new(0.2, -0.1), Point2::new(0.5, 0.3)] {
            assert_relative_eq!(inv.apply(&h.apply(&p)), p, epsilon = 1e-9);
        }
    }

    #[test]
    fn four_points_recover_h() {
        let gt = ground_truth();
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(0.2, 0.0),
            Point2::new(0.2, 0.15),
            Point2::new(0.0, 0.15),
        ];
        let dst: Vec<_> = src.iter().map(|p| gt.apply(p)).collect();
        let est = estimate_homography(&src, &dst).expect("estimate");
        for p in [Point2::new(0.1, 0.05), Point2::new(0.03, 0.12)] {
            assert_relative_eq!(est.apply(&p), gt.apply(&p), epsilon = 1e-6);
        }
    }

    #[test]
    fn overdetermined_grid_recovers_h() {
        let gt = ground_truth();
        let src: Vec<Point2<f64>> = (0..4)
            .flat_map(|j| (0..5).map(move |i| Point2::new(i as f64 * 0.03, j as f64 * 0.03)))
            .collect();
        let dst: Vec<_> = src.iter().map(|p| gt.apply(p)).collect();
        let est = estimate_homography(&src, &dst).expect("estimate");
        assert_relative_eq!(est.h, gt.h, epsilon = 1e-6, max_relative = 1e-6);
    }

    #[test]
    fn mismatched_or_short_inputs_fail() {
        let src = [Point2::new(0.0, 0.0); 4];
        let dst = [Point2::new(1.0, 1.0); 3];
        assert!(estimate_homography(&src, &dst).is_none());
        assert!(estimate_homography(&src[..3], &dst).is_none());
    }
}
