// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic answer cards — renders cards with known registration numbers
// and answers so tests and benchmarks can check the pipeline against ground
// truth.
//
// Card geometry: registration bubbles at (40 + 40c, 60 + 30r), question
// bubbles at x = 40 + (offset + 0.5k) * 40 on the same rows. Empty bubbles
// are rings, marked bubbles are solid disks.

use std::collections::BTreeMap;

use image::{GrayImage, Luma, imageops};
use marksheet_core::config::{FormConfig, QuestionLayout, QuestionStrategy};

pub const CARD_WIDTH: u32 = 900;
pub const CARD_HEIGHT: u32 = 400;
const ORIGIN_X: f32 = 40.0;
const ORIGIN_Y: f32 = 60.0;
const COLUMN_STEP: f32 = 40.0;
const ROW_STEP: f32 = 30.0;
const OUTER_RADIUS: f32 = 8.5;
const INNER_RADIUS: f32 = 4.5;

/// Ground truth for one rendered card.
#[derive(Debug, Clone, PartialEq)]
pub struct CardSpec {
    /// One character per registration column; a space leaves it unmarked.
    pub registration: String,
    /// Question number to the single marked choice.
    pub answers: BTreeMap<u32, u8>,
    /// Additional marks `(question, choice)` beyond `answers`.
    pub extra: Vec<(u32, u8)>,
}

impl CardSpec {
    /// Deterministic card derived from `seed`: five-digit registration and
    /// all forty questions answered.
    pub fn numbered(seed: u32) -> Self {
        let registration = format!("{:05}", (seed * 7919 + 12345) % 100_000);
        let answers = (1..=40u32)
            .map(|q| (q, ((q * 3 + seed * 7) % 5 + 1) as u8))
            .collect();
        Self {
            registration,
            answers,
            extra: Vec::new(),
        }
    }

    fn is_marked(&self, question: u32, choice: u8) -> bool {
        self.answers.get(&question) == Some(&choice) || self.extra.contains(&(question, choice))
    }
}

/// Form tuned to the synthetic geometry: small sampling window and the
/// 0.30 mark threshold.
pub fn synthetic_form() -> FormConfig {
    let mut form = FormConfig::single_card();
    form.name = "synthetic".into();
    form.alignment.align_cards = false;
    form.grid.column_gap = 15.0;
    form.questions.strategy = QuestionStrategy::GridSampling;
    form.questions.cell_half_size = 3;
    form.marking.threshold = 0.30;
    form
}

/// Render one `CARD_WIDTH x CARD_HEIGHT` card.
pub fn render_card(spec: &CardSpec) -> GrayImage {
    let layout = QuestionLayout::default();
    let mut card = GrayImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, Luma([255u8]));

    let digits: Vec<char> = spec.registration.chars().collect();
    for column in 0..5 {
        for row in 0..10u32 {
            let marked = digits
                .get(column)
                .and_then(|d| d.to_digit(10))
                .is_some_and(|d| d == row);
            draw_bubble(
                &mut card,
                ORIGIN_X + COLUMN_STEP * column as f32,
                ORIGIN_Y + ROW_STEP * row as f32,
                marked,
            );
        }
    }

    for (block, offset) in layout.block_offsets.iter().enumerate() {
        for row in 0..layout.questions_per_block {
            let question = (block * layout.questions_per_block + row + 1) as u32;
            for choice in 0..layout.choices_per_block {
                let column = offset + choice as f32 * layout.choice_spacing;
                draw_bubble(
                    &mut card,
                    ORIGIN_X + COLUMN_STEP * column,
                    ORIGIN_Y + ROW_STEP * row as f32,
                    spec.is_marked(question, (choice + 1) as u8),
                );
            }
        }
    }
    card
}

/// Stack cards vertically on white paper with `gutter` rows between them,
/// surrounded by `margin` pixels of `background`.
pub fn render_page(cards: &[GrayImage], gutter: u32, margin: u32, background: u8) -> GrayImage {
    let paper_w = cards.iter().map(GrayImage::width).max().unwrap_or(0);
    let paper_h = cards.iter().map(GrayImage::height).sum::<u32>()
        + gutter * cards.len().saturating_sub(1) as u32;
    let mut page = GrayImage::from_pixel(paper_w + 2 * margin, paper_h + 2 * margin, Luma([background]));
    for y in margin..margin + paper_h {
        for x in margin..margin + paper_w {
            page.put_pixel(x, y, Luma([255u8]));
        }
    }
    let mut top = margin;
    for card in cards {
        imageops::replace(&mut page, card, margin as i64, top as i64);
        top += card.height() + gutter;
    }
    page
}

fn draw_bubble(card: &mut GrayImage, cx: f32, cy: f32, marked: bool) {
    let (cx, cy) = (cx.round(), cy.round());
    let reach = OUTER_RADIUS.ceil() as i32;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let d = ((dx * dx + dy * dy) as f32).sqrt();
            let ink = d <= OUTER_RADIUS && (marked || d >= INNER_RADIUS);
            let (x, y) = (cx as i32 + dx, cy as i32 + dy);
            if ink && x >= 0 && y >= 0 && (x as u32) < card.width() && (y as u32) < card.height() {
                card.put_pixel(x as u32, y as u32, Luma([0u8]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_cards_differ() {
        assert_ne!(CardSpec::numbered(1), CardSpec::numbered(2));
        assert_eq!(CardSpec::numbered(4).registration.len(), 5);
        assert_eq!(CardSpec::numbered(4).answers.len(), 40);
    }

    #[test]
    fn marked_and_empty_bubbles_render() {
        let spec = CardSpec::numbered(0);
        let card = render_card(&spec);
        // Registration "12345": column 0 marks digit 1 at y = 90.
        assert_eq!(card.get_pixel(40, 90).0[0], 0);
        // Digit 0 in column 0 is an empty ring.
        assert_eq!(card.get_pixel(40, 60).0[0], 255);
        assert_eq!(card.get_pixel(47, 60).0[0], 0);
    }

    #[test]
    fn page_stacks_cards_with_gutters() {
        let card = GrayImage::from_pixel(10, 20, Luma([0u8]));
        let page = render_page(&[card.clone(), card], 5, 3, 40);
        assert_eq!(page.dimensions(), (16, 51));
        assert_eq!(page.get_pixel(0, 0).0[0], 40);
        assert_eq!(page.get_pixel(5, 25).0[0], 255);
        assert_eq!(page.get_pixel(5, 30).0[0], 0);
    }
}
