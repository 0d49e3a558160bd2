// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mark classification — darkness score of one sampled cell.

use image::GrayImage;
use marksheet_core::config::MarkingConfig;
use marksheet_core::types::{BoundingBox, MarkCandidate, MarkScore};

/// Mean intensity of `cell` clipped to the image, or `None` when nothing of
/// the cell lies inside.
pub fn mean_intensity(gray: &GrayImage, cell: BoundingBox) -> Option<f32> {
    let (x, y, width, height) = cell.clip(gray.width(), gray.height())?;
    let mut sum = 0u64;
    for yy in y..y + height {
        for xx in x..x + width {
            sum += gray.get_pixel(xx, yy).0[0] as u64;
        }
    }
    Some(sum as f32 / (width as u64 * height as u64) as f32)
}

/// Score a cell as `(255 - mean) / 255`; filled when above `threshold`.
/// Cells entirely outside the image score zero.
pub fn classify_cell(gray: &GrayImage, cell: BoundingBox, threshold: f32) -> MarkScore {
    match mean_intensity(gray, cell) {
        Some(mean) => {
            let score = ((255.0 - mean) / 255.0).clamp(0.0, 1.0);
            MarkScore {
                score,
                filled: score > threshold,
            }
        }
        None => MarkScore::EMPTY,
    }
}

/// Score the central part of a detected candidate, so the printed outline
/// of an empty bubble does not count as ink.
pub fn classify_candidate(
    gray: &GrayImage,
    candidate: &MarkCandidate,
    marking: &MarkingConfig,
) -> MarkScore {
    let cell = candidate.bbox.shrink(marking.candidate_sample_fraction);
    classify_cell(gray, cell, marking.threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn white_and_black_cells() {
        let white = GrayImage::from_pixel(20, 20, Luma([255u8]));
        let black = GrayImage::from_pixel(20, 20, Luma([0u8]));
        let cell = BoundingBox::centered(10, 10, 4);
        assert_eq!(classify_cell(&white, cell, 0.35), MarkScore::EMPTY);
        let filled = classify_cell(&black, cell, 0.35);
        assert_eq!(filled.score, 1.0);
        assert!(filled.filled);
    }

    #[test]
    fn darker_cells_never_score_lower() {
        let cell = BoundingBox::centered(5, 5, 3);
        let mut previous = -1.0f32;
        for level in (0..=255u32).rev().step_by(5) {
            let img = GrayImage::from_pixel(10, 10, Luma([level as u8]));
            let score = classify_cell(&img, cell, 0.35).score;
            assert!(score >= previous, "level {level}");
            previous = score;
        }
    }

    #[test]
    fn threshold_is_strict() {
        // Mean 166 -> score just above 0.349.
        let img = GrayImage::from_pixel(10, 10, Luma([166u8]));
        let score = classify_cell(&img, BoundingBox::centered(5, 5, 2), 0.35);
        assert!(score.score > 0.34 && score.score < 0.35);
        assert!(!score.filled);
    }

    #[test]
    fn window_outside_image_is_empty() {
        let img = GrayImage::from_pixel(10, 10, Luma([0u8]));
        let outside = BoundingBox::centered(-40, -40, 5);
        assert_eq!(classify_cell(&img, outside, 0.3), MarkScore::EMPTY);
    }

    #[test]
    fn window_is_clipped_at_the_edge() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([255u8]));
        img.put_pixel(0, 0, Luma([0u8]));
        // Only the 2x2 corner (x, y in 0..2) is inside.
        let mean = mean_intensity(&img, BoundingBox::centered(0, 0, 2)).expect("inside");
        assert!((mean - 255.0 * 3.0 / 4.0).abs() < 1e-3);
    }

    #[test]
    fn empty_bubble_outline_is_ignored() {
        // 16x16 dark outline two pixels thick around a white interior.
        let img = GrayImage::from_fn(16, 16, |x, y| {
            if x < 2 || y < 2 || x >= 14 || y >= 14 {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        });
        let candidate = MarkCandidate {
            bbox: BoundingBox::new(0, 0, 16, 16),
            area: 225.0,
        };
        let score = classify_candidate(&img, &candidate, &MarkingConfig::default());
        assert_eq!(score.score, 0.0);
    }
}
