// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Marksheet grading pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one grading request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 2-D point in image coordinates (pixels, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

/// Four corners ordered top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub top_left: Point2,
    pub top_right: Point2,
    pub bottom_right: Point2,
    pub bottom_left: Point2,
}

impl Quad {
    pub fn corners(&self) -> [Point2; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            top_left: self.top_left.scaled(factor),
            top_right: self.top_right.scaled(factor),
            bottom_right: self.bottom_right.scaled(factor),
            bottom_left: self.bottom_left.scaled(factor),
        }
    }

    /// Enclosed area via the shoelace formula.
    pub fn area(&self) -> f32 {
        let c = self.corners();
        let mut twice = 0.0f32;
        for i in 0..4 {
            let j = (i + 1) % 4;
            twice += c[i].x * c[j].y - c[j].x * c[i].y;
        }
        twice.abs() / 2.0
    }

    /// True when every turn along the corner sequence has the same sign.
    pub fn is_convex(&self) -> bool {
        let c = self.corners();
        let mut sign = 0.0f32;
        for i in 0..4 {
            let a = c[i];
            let b = c[(i + 1) % 4];
            let d = c[(i + 2) % 4];
            let cross = (b.x - a.x) * (d.y - b.y) - (b.y - a.y) * (d.x - b.x);
            if cross.abs() < f32::EPSILON {
                return false;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }
}

/// Axis-aligned box in pixel coordinates. The origin may lie outside the
/// image; consumers clip before sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square window of side `2 * half` centred on `(cx, cy)`, covering
    /// `[c - half, c + half)` on both axes.
    pub fn centered(cx: i32, cy: i32, half: u32) -> Self {
        Self::new(cx - half as i32, cy - half as i32, half * 2, half * 2)
    }

    pub fn center(&self) -> Point2 {
        Point2::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Shrink around the centre, keeping `fraction` of each side (at least
    /// one pixel).
    pub fn shrink(&self, fraction: f32) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        let width = ((self.width as f32 * fraction).round() as u32).max(1);
        let height = ((self.height as f32 * fraction).round() as u32).max(1);
        let x = self.x + (self.width.saturating_sub(width) / 2) as i32;
        let y = self.y + (self.height.saturating_sub(height) / 2) as i32;
        Self::new(x, y, width, height)
    }

    /// Move every side inwards by `by` pixels, keeping at least one pixel
    /// on each axis.
    pub fn inset(&self, by: u32) -> Self {
        let dx = by.min(self.width.saturating_sub(1) / 2);
        let dy = by.min(self.height.saturating_sub(1) / 2);
        Self::new(
            self.x + dx as i32,
            self.y + dy as i32,
            self.width - 2 * dx,
            self.height - 2 * dy,
        )
    }

    /// Intersect with `[0, image_width) x [0, image_height)`, returning
    /// `(x, y, width, height)` or `None` if nothing remains.
    pub fn clip(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = (self.x as i64).max(0);
        let y1 = (self.y as i64).max(0);
        let x2 = (self.x as i64 + self.width as i64).min(image_width as i64);
        let y2 = (self.y as i64 + self.height as i64).min(image_height as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

/// A small blob-like shape (answer bubble) found inside one card region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkCandidate {
    pub bbox: BoundingBox,
    /// Area enclosed by the source boundary, in square pixels.
    pub area: f32,
}

impl MarkCandidate {
    pub fn center(&self) -> Point2 {
        self.bbox.center()
    }
}

/// One regular 1-D grid axis recovered from clustered peaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Smallest peak.
    pub origin: f32,
    /// Mean spacing between the extreme peaks.
    pub step: f32,
    /// Cluster means, ascending.
    pub peaks: Vec<f32>,
}

impl Axis {
    /// Build an axis from ascending peaks. Needs at least two peaks.
    pub fn from_peaks(peaks: Vec<f32>) -> Option<Self> {
        if peaks.len() < 2 {
            return None;
        }
        let origin = peaks[0];
        let last = peaks[peaks.len() - 1];
        let step = (last - origin) / (peaks.len() - 1) as f32;
        if step <= 0.0 {
            return None;
        }
        Some(Self {
            origin,
            step,
            peaks,
        })
    }

    /// Coordinate of the (possibly fractional) grid index `index`.
    pub fn position(&self, index: f32) -> f32 {
        self.origin + index * self.step
    }

    /// Fractional grid index of `coordinate`.
    pub fn index_of(&self, coordinate: f32) -> f32 {
        (coordinate - self.origin) / self.step
    }
}

/// Column and row axes for one population of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGrid {
    pub columns: Axis,
    pub rows: Axis,
}

/// The grid recovered for one card region.
///
/// Block offsets are calibrated per form and applied by the grading stage;
/// the model only carries origins and steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridModel {
    pub registration: SubGrid,
    /// `None` when the question side lacked enough distinct peaks.
    pub questions: Option<SubGrid>,
}

/// Darkness score for one sampled cell.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MarkScore {
    /// 0.0 = pure white, 1.0 = pure black.
    pub score: f32,
    pub filled: bool,
}

impl MarkScore {
    pub const EMPTY: MarkScore = MarkScore {
        score: 0.0,
        filled: false,
    };
}

/// How far grading got for one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    #[default]
    Graded,
    /// No candidates at all; a valid terminal state.
    NoCandidates,
    /// Fewer than two column or row peaks in the registration section.
    InsufficientGridSignal,
}

/// Structured answers recovered from one card.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CardResult {
    pub card_index: usize,
    pub status: CardStatus,
    /// One digit per resolved registration column, in column order.
    pub registration: String,
    /// Question number (1-based) to selected choices (1-based, ascending).
    pub answers: BTreeMap<u32, Vec<u8>>,
    /// Scores aligned index-by-index with `answers`.
    pub confidences: BTreeMap<u32, Vec<f32>>,
    pub candidate_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridModel>,
}

impl CardResult {
    /// Result for a card whose grid could not be established.
    pub fn empty(card_index: usize, status: CardStatus, candidate_count: usize) -> Self {
        Self {
            card_index,
            status,
            candidate_count,
            ..Self::default()
        }
    }

    /// Record a selected choice; keeps choices ascending and unique.
    pub fn select(&mut self, question: u32, choice: u8, score: f32) {
        let choices = self.answers.entry(question).or_default();
        let scores = self.confidences.entry(question).or_default();
        match choices.binary_search(&choice) {
            Ok(pos) => {
                if score > scores[pos] {
                    scores[pos] = score;
                }
            }
            Err(pos) => {
                choices.insert(pos, choice);
                scores.insert(pos, score);
            }
        }
    }
}

/// Whether the page-level perspective fix was applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlignmentOutcome {
    Rectified { quad: Quad, width: u32, height: u32 },
    /// No usable quadrilateral; the input passed through unchanged.
    Passthrough,
    /// Alignment disabled for this form.
    Skipped,
}

/// Why the segmenter fell back to equal-height strips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    /// Gutter bands missing or not matching the card count.
    NotConfigured,
    EmptyBand { gutter: usize },
    /// Band minimum not clearly below the band mean.
    Ambiguous { gutter: usize },
    /// Split rows not strictly increasing.
    NotIncreasing,
    GapCountMismatch { found: usize, expected: usize },
    /// Equal strips requested explicitly.
    Forced,
}

/// How the page was split into card regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentationOutcome {
    SingleCard,
    Profile { splits: Vec<u32> },
    CandidateGaps { splits: Vec<u32> },
    EqualSplitFallback { fallback: FallbackReason },
}

/// Everything `grade_page` learned about one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub request_id: RequestId,
    pub form: String,
    pub alignment: AlignmentOutcome,
    pub segmentation: SegmentationOutcome,
    pub cards: Vec<CardResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_fully_outside_is_none() {
        let b = BoundingBox::new(-30, -30, 10, 10);
        assert!(b.clip(100, 100).is_none());
        let b = BoundingBox::new(120, 5, 10, 10);
        assert!(b.clip(100, 100).is_none());
    }

    #[test]
    fn clip_partial_overlap() {
        let b = BoundingBox::new(-5, 95, 10, 10);
        assert_eq!(b.clip(100, 100), Some((0, 95, 5, 5)));
    }

    #[test]
    fn shrink_keeps_center() {
        let b = BoundingBox::new(10, 20, 20, 10);
        let s = b.shrink(0.5);
        assert_eq!(s, BoundingBox::new(15, 22, 10, 5));
        assert!((s.center().x - b.center().x).abs() < 0.01);
    }

    #[test]
    fn inset_moves_every_side() {
        assert_eq!(BoundingBox::new(10, 20, 19, 19).inset(1), BoundingBox::new(11, 21, 17, 17));
        assert_eq!(BoundingBox::new(0, 0, 3, 2).inset(5), BoundingBox::new(1, 0, 1, 2));
        assert_eq!(BoundingBox::new(4, 4, 9, 9).inset(0), BoundingBox::new(4, 4, 9, 9));
    }

    #[test]
    fn axis_requires_two_peaks() {
        assert!(Axis::from_peaks(vec![10.0]).is_none());
        let axis = Axis::from_peaks(vec![10.0, 20.0, 30.0]).expect("valid axis");
        assert!((axis.step - 10.0).abs() < 1e-6);
        assert!((axis.position(2.0) - 30.0).abs() < 1e-6);
        assert!((axis.index_of(25.0) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn quad_area_and_convexity() {
        let quad = Quad {
            top_left: Point2::new(0.0, 0.0),
            top_right: Point2::new(10.0, 0.0),
            bottom_right: Point2::new(10.0, 5.0),
            bottom_left: Point2::new(0.0, 5.0),
        };
        assert!((quad.area() - 50.0).abs() < 1e-3);
        assert!(quad.is_convex());

        let bowtie = Quad {
            top_left: Point2::new(0.0, 0.0),
            top_right: Point2::new(10.0, 5.0),
            bottom_right: Point2::new(10.0, 0.0),
            bottom_left: Point2::new(0.0, 5.0),
        };
        assert!(!bowtie.is_convex());
    }

    #[test]
    fn select_keeps_choices_sorted_and_unique() {
        let mut result = CardResult::default();
        result.select(3, 4, 0.6);
        result.select(3, 2, 0.5);
        result.select(3, 4, 0.9);
        assert_eq!(result.answers[&3], vec![2, 4]);
        assert_eq!(result.confidences[&3], vec![0.5, 0.9]);
    }

    #[test]
    fn card_result_serializes_question_keys() {
        let mut result = CardResult::default();
        result.registration = "10405".into();
        result.select(1, 3, 0.8);
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["registration"], "10405");
        assert_eq!(json["answers"]["1"][0], 3);
        assert!(json.get("grid").is_none());
    }
}
