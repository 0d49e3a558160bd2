// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grading orchestration — page in, one structured result per card out.
//
// A page is aligned once, segmented into card regions, and every region is
// graded independently on the rayon pool. Results come back in card order
// regardless of which worker finished first.

use image::{DynamicImage, GrayImage};
use marksheet_core::config::{AlignmentConfig, FormConfig, QuestionLayout, QuestionStrategy};
use marksheet_core::error::{MarksheetError, Result};
use marksheet_core::types::{
    Axis, BoundingBox, CardResult, CardStatus, MarkCandidate, PageReport, RequestId, SubGrid,
};
use rayon::prelude::*;
use tracing::{debug, info, info_span, instrument, warn};

use crate::align::{AlignedImage, align};
use crate::classify::{classify_candidate, classify_cell};
use crate::detect::detect;
use crate::grid::infer_grid;
use crate::region::CardRegion;
use crate::segment::segment;

/// Grade one page and return one result per expected card, in card order.
pub fn grade_page(page: DynamicImage, form: &FormConfig) -> Result<Vec<CardResult>> {
    Ok(grade_page_report(page, form)?.cards)
}

/// Grade one page, keeping the alignment and segmentation outcomes.
///
/// Fails with [`MarksheetError::NoStructureDetected`] when not a single
/// candidate was found on any card.
pub fn grade_page_report(page: DynamicImage, form: &FormConfig) -> Result<PageReport> {
    form.validate()?;
    let request_id = RequestId::new();
    let span = info_span!("grade_page", %request_id, form = %form.name);
    let _guard = span.enter();
    info!(width = page.width(), height = page.height(), "Grading page");

    let aligned = if form.alignment.align_page {
        align(page, &form.alignment)
    } else {
        AlignedImage::skipped(page)
    };

    let segmentation = segment(&aligned.image, form);
    let cards: Vec<CardResult> = segmentation
        .regions
        .into_par_iter()
        .map(|region| {
            let _card = info_span!(parent: &span, "card", index = region.index()).entered();
            let mut region = if form.alignment.align_cards {
                realign(region, &form.alignment)
            } else {
                region
            };
            let result = grade_card(&region, form);
            region.clear_cache();
            result
        })
        .collect();

    if cards.iter().all(|card| card.candidate_count == 0) {
        warn!("No candidates on any card");
        return Err(MarksheetError::NoStructureDetected);
    }

    let graded = cards
        .iter()
        .filter(|card| card.status == CardStatus::Graded)
        .count();
    info!(cards = cards.len(), graded, "Page graded");

    Ok(PageReport {
        request_id,
        form: form.name.clone(),
        alignment: aligned.outcome,
        segmentation: segmentation.outcome,
        cards,
    })
}

/// Rectify one card crop on its own; the card keeps its page position.
fn realign(region: CardRegion, config: &AlignmentConfig) -> CardRegion {
    let index = region.index();
    region.map_image(|image| {
        let rectified = align(image, config);
        debug!(card = index, outcome = ?rectified.outcome, "Card alignment");
        rectified.image
    })
}

/// Detect, infer the grid, then read registration digits and answers from
/// one card region.
#[instrument(skip_all, fields(card = region.index()))]
pub fn grade_card(region: &CardRegion, form: &FormConfig) -> CardResult {
    let candidates = detect(region, &form.detection);
    grade_candidates(region, &candidates, form)
}

/// Grade a region from an already detected candidate set.
pub fn grade_candidates(
    region: &CardRegion,
    candidates: &[MarkCandidate],
    form: &FormConfig,
) -> CardResult {
    let index = region.index();
    if candidates.is_empty() {
        debug!(card = index, "No candidates");
        return CardResult::empty(index, CardStatus::NoCandidates, 0);
    }

    let grid = match infer_grid(candidates, region.width(), region.height(), &form.grid) {
        Ok(grid) => grid,
        Err(err) => {
            warn!(card = index, %err, "Grid inference failed");
            return CardResult::empty(index, CardStatus::InsufficientGridSignal, candidates.len());
        }
    };

    let gray = region.gray();
    let mut result = CardResult::empty(index, CardStatus::Graded, candidates.len());
    result.registration = read_registration(gray, candidates, &grid.registration, form);
    match form.questions.strategy {
        QuestionStrategy::CandidateMapping => {
            map_candidates(gray, candidates, &grid.registration, form, &mut result)
        }
        QuestionStrategy::GridSampling => sample_grid(gray, &grid.registration, form, &mut result),
    }
    result.grid = Some(grid);

    debug!(
        card = index,
        registration = %result.registration,
        answered = result.answers.len(),
        "Card graded"
    );
    result
}

/// One digit per registration column: among filled candidates near the
/// column peak, the darkest wins and the distance to its digit row breaks
/// ties. Columns without a filled candidate contribute nothing.
fn read_registration(
    gray: &GrayImage,
    candidates: &[MarkCandidate],
    grid: &SubGrid,
    form: &FormConfig,
) -> String {
    let layout = &form.registration;
    let rows = &grid.rows;
    let mut digits = String::with_capacity(layout.column_count);

    for peak in grid.columns.peaks.iter().take(layout.column_count) {
        let mut best: Option<(u32, f32, f32)> = None;
        for candidate in candidates {
            let center = candidate.center();
            if (center.x - peak).abs() >= layout.column_tolerance {
                continue;
            }
            let digit = rows.index_of(center.y).round();
            if digit < 0.0 || digit >= layout.row_count.min(10) as f32 {
                continue;
            }
            let mark = classify_candidate(gray, candidate, &form.marking);
            if !mark.filled {
                continue;
            }
            let residual = (center.y - rows.position(digit)).abs();
            let better = best.is_none_or(|(_, score, r)| {
                mark.score > score || (mark.score == score && residual < r)
            });
            if better {
                best = Some((digit as u32, mark.score, residual));
            }
        }
        if let Some(digit) = best.and_then(|(d, _, _)| char::from_digit(d, 10)) {
            digits.push(digit);
        }
    }
    digits
}

/// Map each filled candidate to (block, row, choice) using the registration
/// grid. Candidates that fall outside every block are ignored.
fn map_candidates(
    gray: &GrayImage,
    candidates: &[MarkCandidate],
    grid: &SubGrid,
    form: &FormConfig,
    result: &mut CardResult,
) {
    let layout = &form.questions;

    for candidate in candidates {
        let center = candidate.center();
        let column = grid.columns.index_of(center.x);
        if column < layout.min_column_offset {
            continue;
        }
        let row = grid.rows.index_of(center.y).round();
        if row < 0.0 || row >= layout.questions_per_block as f32 {
            continue;
        }
        let Some((block, choice)) = nearest_choice(column, layout) else {
            continue;
        };
        let score = classify_candidate(gray, candidate, &form.marking);
        if score.filled {
            let question = question_number(block, row as usize, layout.questions_per_block);
            result.select(question, choice, score.score);
        }
    }
}

/// Block and 1-based choice for a fractional column index. Neighbouring
/// blocks' margins may overlap; the block whose nearest choice lies closest
/// wins.
fn nearest_choice(column: f32, layout: &QuestionLayout) -> Option<(usize, u8)> {
    let span = layout.choices_per_block.saturating_sub(1) as f32 * layout.choice_spacing;
    let mut best: Option<(usize, u8, f32)> = None;
    for (block, offset) in layout.block_offsets.iter().enumerate() {
        if column < offset - layout.block_margin || column > offset + span + layout.block_margin {
            continue;
        }
        let slot = ((column - offset) / layout.choice_spacing).round();
        if slot < 0.0 || slot >= layout.choices_per_block as f32 {
            continue;
        }
        let residual = (column - (offset + slot * layout.choice_spacing)).abs();
        if best.is_none_or(|(_, _, r)| residual < r) {
            best = Some((block, slot as u8 + 1, residual));
        }
    }
    best.map(|(block, choice, _)| (block, choice))
}

/// Sample every theoretical cell of every block, whether or not a candidate
/// was detected there.
fn sample_grid(gray: &GrayImage, grid: &SubGrid, form: &FormConfig, result: &mut CardResult) {
    let layout = &form.questions;
    for (block, offset) in layout.block_offsets.iter().enumerate() {
        for row in 0..layout.questions_per_block {
            for choice in 0..layout.choices_per_block {
                let cell = cell_window(
                    &grid.columns,
                    &grid.rows,
                    offset + choice as f32 * layout.choice_spacing,
                    row as f32,
                    layout.cell_half_size,
                );
                let score = classify_cell(gray, cell, form.marking.threshold);
                if score.filled {
                    let question = question_number(block, row, layout.questions_per_block);
                    result.select(question, (choice + 1) as u8, score.score);
                }
            }
        }
    }
}

fn cell_window(columns: &Axis, rows: &Axis, column: f32, row: f32, half: u32) -> BoundingBox {
    let x = columns.position(column) as i32;
    let y = rows.position(row) as i32;
    BoundingBox::centered(x, y, half)
}

/// 1-based question number.
fn question_number(block: usize, row: usize, per_block: usize) -> u32 {
    (block * per_block + row + 1) as u32
}
