// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Card segmentation — splits a rectified page into one region per card.
//
// Three strategies are supported:
//   - projection profile: per-row ink counts, smoothed, minimum inside each
//     configured gutter band
//   - candidate gaps: large vertical gaps between detected bubbles
//   - equal strips
//
// Every strategy yields exactly `expected_card_count` regions, ordered top to
// bottom and non-overlapping. When the chosen strategy cannot produce
// trustworthy splits the page is cut into equal strips and the reason is
// recorded in the outcome.

use image::{DynamicImage, GrayImage};
use marksheet_core::config::{Band, FormConfig, SegmentationStrategy};
use marksheet_core::types::{FallbackReason, MarkCandidate, SegmentationOutcome};
use tracing::{debug, info, instrument, warn};

use crate::detect::detect_candidates;
use crate::image::otsu_inverted;
use crate::region::CardRegion;

/// Card regions plus how they were found.
#[derive(Debug)]
pub struct Segmentation {
    pub regions: Vec<CardRegion>,
    pub outcome: SegmentationOutcome,
}

/// Split `page` into the form's expected number of card regions.
#[instrument(skip_all, fields(form = %form.name, height = page.height()))]
pub fn segment(page: &DynamicImage, form: &FormConfig) -> Segmentation {
    let count = form.layout.expected_card_count.max(1);
    let height = page.height();

    if count == 1 {
        return Segmentation {
            regions: vec![CardRegion::from_image(page.clone())],
            outcome: SegmentationOutcome::SingleCard,
        };
    }

    let found = match &form.layout.segmentation {
        SegmentationStrategy::ProjectionProfile {
            gutter_bands,
            smoothing_window,
            ambiguity_ratio,
        } => {
            let ink = otsu_inverted(&page.to_luma8());
            let smoothed = smooth(&row_profile(&ink), *smoothing_window);
            find_gutters(&smoothed, count, gutter_bands, *ambiguity_ratio)
                .map(|splits| (splits.clone(), SegmentationOutcome::Profile { splits }))
        }
        SegmentationStrategy::CandidateGaps { min_gap } => {
            let candidates = detect_candidates(&page.to_luma8(), &form.detection);
            gap_splits(&candidates, count, *min_gap)
                .map(|splits| (splits.clone(), SegmentationOutcome::CandidateGaps { splits }))
        }
        SegmentationStrategy::EqualStrips => Err(FallbackReason::Forced),
    };

    let (splits, outcome) = match found {
        Ok((splits, outcome)) => {
            info!(?splits, "Card boundaries found");
            (splits, outcome)
        }
        Err(fallback) => {
            if fallback != FallbackReason::Forced {
                warn!(?fallback, "Falling back to equal-height card strips");
            }
            (
                equal_splits(height, count),
                SegmentationOutcome::EqualSplitFallback { fallback },
            )
        }
    };

    Segmentation {
        regions: cut_regions(page, &splits, form.layout.card_padding),
        outcome,
    }
}

/// Count of ink pixels in each row.
pub fn row_profile(binary: &GrayImage) -> Vec<f32> {
    binary
        .rows()
        .map(|row| row.filter(|p| p.0[0] > 0).count() as f32)
        .collect()
}

/// Moving average over `window` rows. Row `i` averages rows
/// `[i - window/2, i - window/2 + window)`, treating rows outside the page
/// as empty.
pub fn smooth(profile: &[f32], window: usize) -> Vec<f32> {
    let window = window.max(1);
    let half = window / 2;
    let mut prefix = Vec::with_capacity(profile.len() + 1);
    prefix.push(0.0f64);
    for value in profile {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + *value as f64);
    }
    (0..profile.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + window - half).min(profile.len());
            ((prefix[end] - prefix[start]) / window as f64) as f32
        })
        .collect()
}

/// Locate one split row per gutter band.
///
/// The split is the first row holding the band's minimum. A band whose
/// minimum exceeds `ambiguity_ratio` times the band mean has no clear gutter.
pub fn find_gutters(
    smoothed: &[f32],
    count: usize,
    bands: &[Band],
    ambiguity_ratio: f32,
) -> Result<Vec<u32>, FallbackReason> {
    if bands.len() + 1 != count {
        return Err(FallbackReason::NotConfigured);
    }
    let height = smoothed.len();
    let mut splits = Vec::with_capacity(bands.len());

    for (gutter, band) in bands.iter().enumerate() {
        let lo = ((height as f32 * band.min) as usize).min(height);
        let hi = ((height as f32 * band.max) as usize).min(height);
        if hi <= lo {
            return Err(FallbackReason::EmptyBand { gutter });
        }
        let slice = &smoothed[lo..hi];
        let mut argmin = 0;
        for (i, value) in slice.iter().enumerate() {
            if *value < slice[argmin] {
                argmin = i;
            }
        }
        let minimum = slice[argmin];
        let mean = slice.iter().sum::<f32>() / slice.len() as f32;
        debug!(gutter, lo, hi, row = lo + argmin, minimum, mean, "Gutter band scanned");
        if minimum > ambiguity_ratio * mean {
            return Err(FallbackReason::Ambiguous { gutter });
        }
        splits.push((lo + argmin) as u32);
    }

    check_splits(&splits, height as u32)?;
    Ok(splits)
}

/// Split between candidate clusters separated by more than `min_gap` rows.
pub fn gap_splits(
    candidates: &[MarkCandidate],
    count: usize,
    min_gap: u32,
) -> Result<Vec<u32>, FallbackReason> {
    let mut sorted: Vec<&MarkCandidate> = candidates.iter().collect();
    sorted.sort_by_key(|c| c.bbox.y);

    let mut splits = Vec::new();
    let mut lowest_edge: Option<i32> = None;
    for candidate in sorted {
        if let Some(edge) = lowest_edge {
            if candidate.bbox.y - edge > min_gap as i32 {
                splits.push(((edge + candidate.bbox.y) / 2).max(0) as u32);
            }
        }
        let bottom = candidate.bbox.bottom();
        lowest_edge = Some(lowest_edge.map_or(bottom, |edge| edge.max(bottom)));
    }

    if splits.len() + 1 != count {
        return Err(FallbackReason::GapCountMismatch {
            found: splits.len() + 1,
            expected: count,
        });
    }
    Ok(splits)
}

/// `count - 1` split rows dividing `height` into equal strips.
pub fn equal_splits(height: u32, count: usize) -> Vec<u32> {
    let count = count.max(1) as u64;
    (1..count)
        .map(|i| (height as u64 * i / count) as u32)
        .collect()
}

fn check_splits(splits: &[u32], height: u32) -> Result<(), FallbackReason> {
    let increasing = splits.windows(2).all(|w| w[0] < w[1]);
    let inside = splits.iter().all(|s| *s > 0 && *s < height);
    if increasing && inside {
        Ok(())
    } else {
        Err(FallbackReason::NotIncreasing)
    }
}

/// Cut `[0, split_1), [split_1, split_2), ..., [split_n, height)`, trimming
/// `padding` rows on each inner edge. Padding is skipped where it would
/// leave a region empty.
fn cut_regions(page: &DynamicImage, splits: &[u32], padding: u32) -> Vec<CardRegion> {
    let height = page.height();
    let mut bounds = Vec::with_capacity(splits.len() + 2);
    bounds.push(0);
    bounds.extend_from_slice(splits);
    bounds.push(height);

    bounds
        .windows(2)
        .enumerate()
        .map(|(index, w)| {
            let (start, end) = (w[0], w[1].max(w[0]));
            let (mut top, mut bottom) = (start, end);
            if end.saturating_sub(start) > 2 * padding {
                top = start + padding;
                bottom = end - padding;
            }
            let crop = page.crop_imm(0, top, page.width(), bottom - top);
            CardRegion::new(index, top, crop)
        })
        .collect()
}
