//! Edge/contour analysis for crack metrics.
//!
//! Pipeline: grayscale -> Gaussian blur -> Canny -> external contours.
//! Metrics are derived from contour arc lengths.

use image::{imageops, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::geometry::arc_length;
use imageproc::point::Point;

/// Pixel arc length to the "largest crack" figure. Uncalibrated.
pub const LARGEST_CRACK_DIVISOR: f64 = 100.0;
/// Pixel arc length to the "average width" figure. Uncalibrated.
pub const AVG_WIDTH_DIVISOR: f64 = 1000.0;

/// Closed contour in image coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
}

impl Contour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    /// Perimeter of the closed polyline.
    pub fn arc_length(&self) -> f64 {
        arc_length(&self.points, true)
    }
}

/// Extracts external contours from a frame.
pub trait ContourExtractor: Send + Sync {
    fn extract(&self, frame: &RgbImage) -> Vec<Contour>;
}

/// Canny edge detector followed by outer-border tracing.
#[derive(Clone, Debug)]
pub struct CannyContours {
    pub blur_sigma: f32,
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl Default for CannyContours {
    fn default() -> Self {
        // sigma matches a 5x5 kernel with automatic sigma selection.
        Self {
            blur_sigma: 1.1,
            low_threshold: 50.0,
            high_threshold: 150.0,
        }
    }
}

impl ContourExtractor for CannyContours {
    fn extract(&self, frame: &RgbImage) -> Vec<Contour> {
        let gray = imageops::grayscale(frame);
        let blurred = imageproc::filter::gaussian_blur_f32(&gray, self.blur_sigma);
        let edges = imageproc::edges::canny(&blurred, self.low_threshold, self.high_threshold);
        find_contours::<i32>(&edges)
            .into_iter()
            .filter(|contour| {
                contour.parent.is_none() && matches!(contour.border_type, BorderType::Outer)
            })
            .map(|contour| Contour::new(contour.points))
            .collect()
    }
}

/// Crack metrics derived from a set of contours.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CrackMetrics {
    pub count: usize,
    pub largest: f64,
    pub avg_width: f64,
}

impl CrackMetrics {
    pub fn from_arc_lengths(lengths: &[f64]) -> Self {
        if lengths.is_empty() {
            return Self::default();
        }
        let max = lengths.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        Self {
            count: lengths.len(),
            largest: max / LARGEST_CRACK_DIVISOR,
            avg_width: mean / AVG_WIDTH_DIVISOR,
        }
    }

    pub fn from_contours(contours: &[Contour]) -> Self {
        let lengths: Vec<f64> = contours.iter().map(Contour::arc_length).collect();
        Self::from_arc_lengths(&lengths)
    }
}

/// Draw closed contours onto `canvas` with the given stroke width.
pub fn draw_contours(canvas: &mut RgbImage, contours: &[Contour], color: Rgb<u8>, thickness: u32) {
    let half = (thickness.max(1) as i32 - 1) / 2;
    let spread = thickness.max(1) as i32;
    for contour in contours {
        let points = &contour.points;
        if points.is_empty() {
            continue;
        }
        for (i, start) in points.iter().enumerate() {
            let end = &points[(i + 1) % points.len()];
            for dx in 0..spread {
                for dy in 0..spread {
                    let ox = (dx - half) as f32;
                    let oy = (dy - half) as f32;
                    draw_line_segment_mut(
                        canvas,
                        (start.x as f32 + ox, start.y as f32 + oy),
                        (end.x as f32 + ox, end.y as f32 + oy),
                        color,
                    );
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
