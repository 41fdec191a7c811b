//! Detection feedback drawn onto a copy of the frame.
//!
//! Found corners get a cross each, coloured by row, joined by a polyline in
//! detector order; the first corner gets a larger mark so a flipped ordering
//! is visible at a glance. A missed detection gets a red frame border.

use calib_ar_core::PatternSpec;
use image::{Rgb, RgbImage};
use nalgebra::Point2;

const ROW_COLORS: [[u8; 3]; 7] = [
    [255, 0, 0],
    [255, 128, 0],
    [200, 200, 0],
    [0, 255, 0],
    [0, 200, 200],
    [0, 0, 255],
    [255, 0, 255],
];
const MISS_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BORDER: u32 = 4;
const CROSS_HALF: i64 = 4;

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && x < img.width() as i64 && y < img.height() as i64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

/// Liang-Barsky clip of `a -> b` to the pixel area of `img`.
fn clip_segment(
    img: &RgbImage,
    a: Point2<f64>,
    b: Point2<f64>,
) -> Option<(Point2<f64>, Point2<f64>)> {
    let (w, h) = (img.width() as f64, img.height() as f64);
    let d = b - a;
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-d.x, a.x + 0.5),
        (d.x, w - 0.5 - a.x),
        (-d.y, a.y + 0.5),
        (d.y, h - 0.5 - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    (t0 <= t1).then(|| (a + d * t0, a + d * t1))
}

fn line(img: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, color: Rgb<u8>) {
    let Some((a, b)) = clip_segment(img, a, b) else {
        return;
    };
    let steps = (b - a).abs().max().ceil().max(1.0) as usize;
    for s in 0..=steps {
        let p = a + (b - a) * (s as f64 / steps as f64);
        put(img, p.x.round() as i64, p.y.round() as i64, color);
    }
}

fn cross(img: &mut RgbImage, p: Point2<f64>, half: i64, color: Rgb<u8>) {
    let reach = half as f64 + 1.0;
    if p.x < -reach
        || p.y < -reach
        || p.x > img.width() as f64 + reach
        || p.y > img.height() as f64 + reach
    {
        return;
    }
    let (x, y) = (p.x.round() as i64, p.y.round() as i64);
    for d in -half..=half {
        put(img, x + d, y + d, color);
        put(img, x + d, y - d, color);
    }
}

/// Annotated copy of `frame`; `corners` is the detection result.
pub fn annotate(
    frame: &RgbImage,
    pattern: &PatternSpec,
    corners: Option<&[Point2<f64>]>,
) -> RgbImage {
    let mut out = frame.clone();
    match corners {
        Some(corners) => draw_corners(&mut out, pattern, corners),
        None => draw_miss(&mut out),
    }
    out
}

fn draw_corners(img: &mut RgbImage, pattern: &PatternSpec, corners: &[Point2<f64>]) {
    let cols = pattern.columns().max(1);
    let color_of = |idx: usize| Rgb(ROW_COLORS[(idx / cols) % ROW_COLORS.len()]);

    for (idx, pair) in corners.windows(2).enumerate() {
        line(img, pair[0], pair[1], color_of(idx + 1));
    }
    for (idx, p) in corners.iter().enumerate() {
        cross(img, *p, CROSS_HALF, color_of(idx));
    }
    if let Some(first) = corners.first() {
        cross(img, *first, 2 * CROSS_HALF, color_of(0));
    }
}

fn draw_miss(img: &mut RgbImage) {
    let (w, h) = img.dimensions();
    for y in 0..h {
        for x in 0..w {
            if x < BORDER || y < BORDER || x + BORDER >= w || y + BORDER >= h {
                img.put_pixel(x, y, MISS_COLOR);
            }
        }
    }
}
