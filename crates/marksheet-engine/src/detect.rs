// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Candidate detection — extracts bubble-sized blobs from a card region.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;
use marksheet_core::config::{DetectionConfig, MorphologyStep};
use marksheet_core::types::{BoundingBox, MarkCandidate};
use tracing::{debug, instrument};

use crate::image::{apply_morphology, binarize};
use crate::region::CardRegion;

/// Detect answer-bubble candidates in one card region.
#[instrument(skip_all, fields(card = region.index()))]
pub fn detect(region: &CardRegion, config: &DetectionConfig) -> Vec<MarkCandidate> {
    detect_candidates(region.gray(), config)
}

/// Binarize, clean up, trace outer boundaries and keep bubble-shaped blobs.
///
/// Boxes describe the ink: a dilation step's growth is taken off again
/// before the shape filters run. Candidates closer than `dedup_distance` to an earlier one (scanning left
/// to right) are dropped, so no two survivors share a centre. An empty
/// result is a normal outcome.
pub fn detect_candidates(gray: &GrayImage, config: &DetectionConfig) -> Vec<MarkCandidate> {
    let binary = binarize(gray, &config.threshold);
    let cleaned = apply_morphology(&binary, config.morphology);
    let growth = match config.morphology {
        MorphologyStep::Dilate { radius } => u32::from(radius),
        MorphologyStep::None | MorphologyStep::Open { .. } => 0,
    };

    let contours = find_contours::<i32>(&cleaned);
    let total = contours.len();
    let accepted: Vec<MarkCandidate> = contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| MarkCandidate {
            bbox: bounding_box(&c.points).inset(growth),
            area: enclosed_area(&c.points),
        })
        .filter(|c| accept(c, config))
        .collect();

    let candidates = dedup(accepted, config.dedup_distance);
    debug!(contours = total, candidates = candidates.len(), "Candidates detected");
    candidates
}

/// Size, aspect and area filters.
pub fn accept(candidate: &MarkCandidate, config: &DetectionConfig) -> bool {
    let bbox = candidate.bbox;
    config.size_band.contains(bbox.width as f32)
        && config.size_band.contains(bbox.height as f32)
        && config.aspect_band.contains(bbox.aspect_ratio())
        && candidate.area > config.min_area
}

/// Drop candidates whose centre lies within `distance` of an already kept
/// one. Candidates are visited in ascending x order, so the result is
/// sorted by x.
pub fn dedup(mut candidates: Vec<MarkCandidate>, distance: f32) -> Vec<MarkCandidate> {
    candidates.sort_by(|a, b| {
        a.center()
            .x
            .total_cmp(&b.center().x)
            .then(a.center().y.total_cmp(&b.center().y))
    });
    let mut kept: Vec<MarkCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let center = candidate.center();
        if kept.iter().all(|k| k.center().distance(&center) >= distance) {
            kept.push(candidate);
        }
    }
    kept
}

fn bounding_box(points: &[Point<i32>]) -> BoundingBox {
    let (mut min_x, mut min_y) = (i32::MAX, i32::MAX);
    let (mut max_x, mut max_y) = (i32::MIN, i32::MIN);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if points.is_empty() {
        return BoundingBox::new(0, 0, 0, 0);
    }
    BoundingBox::new(
        min_x,
        min_y,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    )
}

fn enclosed_area(points: &[Point<i32>]) -> f32 {
    let n = points.len();
    let mut twice = 0i64;
    for i in 0..n {
        let j = (i + 1) % n;
        twice += points[i].x as i64 * points[j].y as i64 - points[j].x as i64 * points[i].y as i64;
    }
    twice.abs() as f32 / 2.0
}
