// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document alignment — finds the sheet's outer quadrilateral and warps it to
// an axis-aligned rectangle.
//
// The pipeline:
//   1. Downscale to the working height (quad search only)
//   2. Gaussian blur + Canny edges
//   3. Otsu threshold with paper as foreground, OR'd with the edges
//   4. Morphological closing to bridge gaps in the outline
//   5. Outer contours, largest first
//   6. Polygon approximation; the first 4-vertex polygon above the minimum
//      area wins
//   7. Corner ordering, rescale to full resolution, projective warp
//
// When no quadrilateral qualifies the image passes through unchanged. That
// is a normal outcome, not an error.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::close;
use imageproc::point::Point;
use marksheet_core::config::AlignmentConfig;
use marksheet_core::types::{AlignmentOutcome, Point2, Quad};
use tracing::{debug, info, instrument, warn};

use crate::image::otsu_bright;

/// Result of an alignment attempt.
#[derive(Debug)]
pub struct AlignedImage {
    pub image: DynamicImage,
    pub outcome: AlignmentOutcome,
}

impl AlignedImage {
    /// Wrap an image for which alignment was not attempted.
    pub fn skipped(image: DynamicImage) -> Self {
        Self {
            image,
            outcome: AlignmentOutcome::Skipped,
        }
    }
}

/// Rectify `image` if a page quadrilateral can be found.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn align(image: DynamicImage, config: &AlignmentConfig) -> AlignedImage {
    let gray = image.to_luma8();

    let Some(quad) = find_quad(&gray, config) else {
        warn!("No page quadrilateral found; passing image through unchanged");
        return AlignedImage {
            image,
            outcome: AlignmentOutcome::Passthrough,
        };
    };

    match four_point_transform(&image, &quad) {
        Some(warped) => {
            let (width, height) = (warped.width(), warped.height());
            info!(width, height, "Perspective correction applied");
            AlignedImage {
                image: warped,
                outcome: AlignmentOutcome::Rectified {
                    quad,
                    width,
                    height,
                },
            }
        }
        None => {
            warn!("Degenerate quadrilateral; passing image through unchanged");
            AlignedImage {
                image,
                outcome: AlignmentOutcome::Passthrough,
            }
        }
    }
}

/// Search for the largest convex quadrilateral covering at least
/// `min_area_fraction` of the image. Corners are in full-resolution
/// coordinates.
pub fn find_quad(gray: &GrayImage, config: &AlignmentConfig) -> Option<Quad> {
    let (width, height) = gray.dimensions();
    if width < 2 || height < 2 {
        return None;
    }

    let ratio = if config.working_height > 0 && height > config.working_height {
        config.working_height as f32 / height as f32
    } else {
        1.0
    };
    let small = if ratio < 1.0 {
        let small_w = ((width as f32 * ratio).round() as u32).max(1);
        imageops::resize(gray, small_w, config.working_height, FilterType::Triangle)
    } else {
        gray.clone()
    };
    let (small_w, small_h) = small.dimensions();

    let blurred = gaussian_blur_f32(&small, config.blur_sigma);
    let edges = canny(&blurred, config.canny_low, config.canny_high);
    let paper = otsu_bright(&small);
    let combined = GrayImage::from_fn(small_w, small_h, |x, y| {
        Luma([edges.get_pixel(x, y).0[0].max(paper.get_pixel(x, y).0[0])])
    });
    let closed = close(&combined, Norm::LInf, config.close_radius);

    let mut outlines: Vec<(f32, Vec<Point<i32>>)> = find_contours::<i32>(&closed)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 4)
        .map(|c| (polygon_area(&c.points), c.points))
        .collect();
    outlines.sort_by(|a, b| b.0.total_cmp(&a.0));
    debug!(contours = outlines.len(), "Outer contours found");

    let min_area = config.min_area_fraction * small_w as f32 * small_h as f32;
    for (area, points) in outlines.iter().take(config.max_contours) {
        if *area <= min_area {
            // Sorted by area, so nothing further qualifies either.
            break;
        }
        let perimeter = arc_length(points, true);
        let epsilon = (config.approx_epsilon as f64 * perimeter).max(1.0);
        let polygon = approximate_closed_polygon(points, epsilon);
        if polygon.len() != 4 {
            debug!(vertices = polygon.len(), area, "Contour is not a quadrilateral");
            continue;
        }
        let corners = [0, 1, 2, 3].map(|i| Point2::new(polygon[i].x as f32, polygon[i].y as f32));
        let quad = order_points(corners);
        if !quad.is_convex() {
            continue;
        }
        if quad.area() <= min_area {
            debug!(area = quad.area(), "Approximated quadrilateral too small");
            continue;
        }
        let quad = quad.scaled(1.0 / ratio);
        debug!(?quad, area, "Page quadrilateral found");
        return Some(quad);
    }
    None
}

/// Order four corners as top-left, top-right, bottom-right, bottom-left.
///
/// Corners are sorted clockwise (in image coordinates) around their centroid
/// and the cycle starts at the smallest `x + y`, ties going to the smaller
/// `y`. Every input point is used exactly once and the result does not
/// depend on the input order.
pub fn order_points(points: [Point2; 4]) -> Quad {
    let cx = points.iter().map(|p| f64::from(p.x)).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| f64::from(p.y)).sum::<f64>() / 4.0;
    let angle = |p: &Point2| (f64::from(p.y) - cy).atan2(f64::from(p.x) - cx);

    let mut ring = points;
    ring.sort_by(|a, b| {
        angle(a)
            .total_cmp(&angle(b))
            .then(a.x.total_cmp(&b.x))
            .then(a.y.total_cmp(&b.y))
    });
    let start = (0..4)
        .min_by(|&i, &j| {
            let (a, b) = (ring[i], ring[j]);
            (a.x + a.y)
                .total_cmp(&(b.x + b.y))
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        })
        .unwrap_or(0);
    ring.rotate_left(start);

    Quad {
        top_left: ring[0],
        top_right: ring[1],
        bottom_right: ring[2],
        bottom_left: ring[3],
    }
}

/// Warp the quadrilateral to a rectangle whose sides are the longer of each
/// pair of opposite edges. Returns `None` for degenerate quads.
pub fn four_point_transform(image: &DynamicImage, quad: &Quad) -> Option<DynamicImage> {
    let width_bottom = quad.bottom_right.distance(&quad.bottom_left) as u32;
    let width_top = quad.top_right.distance(&quad.top_left) as u32;
    let height_right = quad.top_right.distance(&quad.bottom_right) as u32;
    let height_left = quad.top_left.distance(&quad.bottom_left) as u32;
    let out_w = width_bottom.max(width_top);
    let out_h = height_right.max(height_left);
    if out_w < 2 || out_h < 2 {
        return None;
    }

    let (right, bottom) = ((out_w - 1) as f32, (out_h - 1) as f32);
    let src = quad.corners().map(|p| (p.x, p.y));
    let dest = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];
    let projection = Projection::from_control_points(src, dest)?;

    let warped = match image {
        DynamicImage::ImageLuma8(gray) => {
            let mut output = GrayImage::new(out_w, out_h);
            warp_into(gray, &projection, Interpolation::Bilinear, Luma([255u8]), &mut output);
            DynamicImage::ImageLuma8(output)
        }
        other => {
            let rgba = other.to_rgba8();
            let mut output = RgbaImage::new(out_w, out_h);
            warp_into(
                &rgba,
                &projection,
                Interpolation::Bilinear,
                Rgba([255u8, 255, 255, 255]),
                &mut output,
            );
            DynamicImage::ImageRgba8(output)
        }
    };
    Some(warped)
}

/// Douglas-Peucker on a closed curve, followed by removal of vertices that
/// lie within `epsilon` of the line through their neighbours.
fn approximate_closed_polygon(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let first = points[0];
    let dist2 = |p: &Point<i32>| {
        let (dx, dy) = ((p.x - first.x) as i64, (p.y - first.y) as i64);
        dx * dx + dy * dy
    };
    let mut far = 0;
    for (i, p) in points.iter().enumerate() {
        if dist2(p) > dist2(&points[far]) {
            far = i;
        }
    }
    if far == 0 {
        return vec![first];
    }

    // Split at the farthest point so each half is an open curve.
    let mut polygon = approximate_polygon_dp(&points[..=far], epsilon, false);
    let mut tail = points[far..].to_vec();
    tail.push(first);
    let tail = approximate_polygon_dp(&tail, epsilon, false);
    polygon.pop();
    polygon.extend(tail);
    polygon.pop();

    drop_collinear(polygon, epsilon)
}

fn drop_collinear(mut polygon: Vec<Point<i32>>, epsilon: f64) -> Vec<Point<i32>> {
    loop {
        let n = polygon.len();
        if n <= 3 {
            return polygon;
        }
        let redundant = (0..n).find(|&i| {
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            distance_to_line(polygon[i], prev, next) < epsilon
        });
        match redundant {
            Some(i) => {
                polygon.remove(i);
            }
            None => return polygon,
        }
    }
}

fn distance_to_line(p: Point<i32>, a: Point<i32>, b: Point<i32>) -> f64 {
    let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let length = (dx * dx + dy * dy).sqrt();
    let (px, py) = ((p.x - a.x) as f64, (p.y - a.y) as f64);
    if length == 0.0 {
        return (px * px + py * py).sqrt();
    }
    (dx * py - dy * px).abs() / length
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point<i32>]) -> f32 {
    let n = points.len();
    let mut area = 0.0f32;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x as f32 * points[j].y as f32;
        area -= points[j].x as f32 * points[i].y as f32;
    }
    area.abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbaImage};

    fn quad(points: [(f32, f32); 4]) -> [Point2; 4] {
        points.map(|(x, y)| Point2::new(x, y))
    }

    /// Light rectangle from (50,60) to (350,440) on a dark desk.
    fn sheet_on_desk() -> DynamicImage {
        let mut img = GrayImage::from_pixel(400, 500, Luma([30u8]));
        for y in 60..440 {
            for x in 50..350 {
                img.put_pixel(x, y, Luma([240u8]));
            }
        }
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn blank_image_passes_through() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 300, Luma([200u8])));
        let aligned = align(img, &AlignmentConfig::default());
        assert_eq!(aligned.outcome, AlignmentOutcome::Passthrough);
        assert_eq!((aligned.image.width(), aligned.image.height()), (200, 300));
    }

    #[test]
    fn tiny_rgba_image_does_not_panic() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            50,
            50,
            Rgba([128, 128, 128, 255]),
        ));
        let aligned = align(img, &AlignmentConfig::default());
        assert!(aligned.image.width() > 0);
    }

    #[test]
    fn order_points_is_permutation_invariant() {
        let corners = quad([(12.0, 8.0), (205.0, 15.0), (198.0, 310.0), (4.0, 296.0)]);
        let expected = order_points(corners);
        assert_eq!(expected.top_left, Point2::new(12.0, 8.0));
        assert_eq!(expected.top_right, Point2::new(205.0, 15.0));
        assert_eq!(expected.bottom_right, Point2::new(198.0, 310.0));
        assert_eq!(expected.bottom_left, Point2::new(4.0, 296.0));

        let permutations = [[1, 0, 3, 2], [3, 2, 1, 0], [2, 3, 0, 1], [0, 2, 1, 3]];
        for perm in permutations {
            let shuffled = perm.map(|i| corners[i]);
            assert_eq!(order_points(shuffled), expected, "{perm:?}");
        }
    }

    #[test]
    fn diamond_orders_the_same_from_any_start() {
        // Rotated 45 degrees: x + y and y - x both tie.
        let corners = quad([(50.0, 0.0), (100.0, 50.0), (50.0, 100.0), (0.0, 50.0)]);
        let expected = order_points(corners);
        assert_eq!(expected.top_left, Point2::new(50.0, 0.0));
        assert_eq!(expected.top_right, Point2::new(100.0, 50.0));
        assert_eq!(expected.bottom_right, Point2::new(50.0, 100.0));
        assert_eq!(expected.bottom_left, Point2::new(0.0, 50.0));

        let mut reversed = corners;
        reversed.reverse();
        assert_eq!(order_points(reversed), expected);
        for shift in 1..4 {
            let mut rotated = corners;
            rotated.rotate_left(shift);
            assert_eq!(order_points(rotated), expected, "shift {shift}");
        }
        assert!(expected.is_convex());
    }

    #[test]
    fn every_corner_is_used_once() {
        let corners = quad([(0.0, 40.0), (60.0, 0.0), (100.0, 60.0), (40.0, 100.0)]);
        let q = order_points(corners);
        for corner in corners {
            assert_eq!(q.corners().iter().filter(|c| **c == corner).count(), 1);
        }
    }

    #[test]
    fn rectangle_warps_to_its_own_size() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 200, Luma([255u8])));
        let q = order_points(quad([(10.0, 20.0), (210.0, 20.0), (210.0, 120.0), (10.0, 120.0)]));
        let out = four_point_transform(&img, &q).expect("warp");
        assert!((out.width() as i64 - 200).abs() <= 1);
        assert!((out.height() as i64 - 100).abs() <= 1);
    }

    #[test]
    fn skewed_quad_uses_longest_edges() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 300, Luma([255u8])));
        // Top edge 150 long, bottom edge 200 long, sides 100 tall.
        let q = order_points(quad([(50.0, 50.0), (200.0, 50.0), (225.0, 150.0), (25.0, 150.0)]));
        let out = four_point_transform(&img, &q).expect("warp");
        assert_eq!(out.width(), 200);
        assert!((out.height() as i64 - 103).abs() <= 1);
    }

    #[test]
    fn degenerate_quad_is_rejected() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        let point = Point2::new(3.0, 3.0);
        let q = Quad {
            top_left: point,
            top_right: point,
            bottom_right: point,
            bottom_left: point,
        };
        assert!(four_point_transform(&img, &q).is_none());
    }

    #[test]
    fn sheet_on_desk_is_found_and_rectified() {
        let aligned = align(sheet_on_desk(), &AlignmentConfig::default());
        match aligned.outcome {
            AlignmentOutcome::Rectified { quad, width, height } => {
                assert!((width as i64 - 300).abs() <= 3, "width {width}");
                assert!((height as i64 - 380).abs() <= 3, "height {height}");
                assert!((quad.top_left.x - 50.0).abs() <= 3.0);
                assert!((quad.top_left.y - 60.0).abs() <= 3.0);
            }
            other => panic!("expected rectification, got {other:?}"),
        }
        // Paper fills the output, so its centre is bright.
        let gray = aligned.image.to_luma8();
        let (w, h) = gray.dimensions();
        assert!(gray.get_pixel(w / 2, h / 2).0[0] > 200);
    }

    #[test]
    fn quad_search_works_on_downscaled_copy() {
        // Twice the working height: corners must come back in full-size pixels.
        let mut img = GrayImage::from_pixel(800, 1000, Luma([25u8]));
        for y in 100..900 {
            for x in 100..700 {
                img.put_pixel(x, y, Luma([235u8]));
            }
        }
        let config = AlignmentConfig {
            working_height: 500,
            ..AlignmentConfig::default()
        };
        let q = find_quad(&img, &config).expect("quad");
        assert!((q.top_left.x - 100.0).abs() <= 4.0, "{q:?}");
        assert!((q.bottom_right.y - 900.0).abs() <= 4.0, "{q:?}");
    }

    #[test]
    fn small_shapes_are_ignored() {
        // A bright 20x20 patch is far below 10% of the image area.
        let mut img = GrayImage::from_pixel(300, 300, Luma([20u8]));
        for y in 100..120 {
            for x in 100..120 {
                img.put_pixel(x, y, Luma([250u8]));
            }
        }
        assert!(find_quad(&img, &AlignmentConfig::default()).is_none());
    }

    #[test]
    fn closed_polygon_approximation_keeps_corners() {
        let mut outline = Vec::new();
        for x in 0..50 {
            outline.push(Point::new(x, 0));
        }
        for y in 0..30 {
            outline.push(Point::new(50, y));
        }
        for x in (1..=50).rev() {
            outline.push(Point::new(x, 30));
        }
        for y in (1..=30).rev() {
            outline.push(Point::new(0, y));
        }
        let polygon = approximate_closed_polygon(&outline, 3.0);
        assert_eq!(polygon.len(), 4, "{polygon:?}");
        assert!((polygon_area(&polygon) - 1500.0).abs() < 1.0);
    }
}
