// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the marksheet-engine crate: perspective
// correction, candidate detection, single-card grading and a full
// three-card page on synthetic cards.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma};

use marksheet_core::FormConfig;
use marksheet_engine::synthetic::{CardSpec, render_card, render_page, synthetic_form};
use marksheet_engine::{CardRegion, align, detect_candidates, grade_card, grade_page};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Perspective correction of a light sheet on a dark desk.
fn bench_alignment(c: &mut Criterion) {
    let mut img = GrayImage::from_pixel(800, 1000, Luma([30u8]));
    for y in 100..900 {
        for x in 80..720 {
            img.put_pixel(x, y, Luma([240u8]));
        }
    }
    let dynamic = DynamicImage::ImageLuma8(img);
    let form = synthetic_form();

    c.bench_function("align (800x1000)", |b| {
        b.iter(|| black_box(align(black_box(dynamic.clone()), &form.alignment)));
    });
}

fn bench_detection(c: &mut Criterion) {
    let card = render_card(&CardSpec::numbered(1));
    let form = synthetic_form();

    c.bench_function("detect_candidates (one card)", |b| {
        b.iter(|| black_box(detect_candidates(black_box(&card), &form.detection)));
    });
}

fn bench_grade_card(c: &mut Criterion) {
    let card = render_card(&CardSpec::numbered(2));
    let form = synthetic_form();

    c.bench_function("grade_card (one card)", |b| {
        b.iter(|| {
            let region = CardRegion::from_image(DynamicImage::ImageLuma8(card.clone()));
            black_box(grade_card(&region, &form))
        });
    });
}

/// Whole page: alignment, profile segmentation and three cards graded in
/// parallel.
fn bench_grade_page(c: &mut Criterion) {
    let cards: Vec<GrayImage> = (1..=3)
        .map(|seed| render_card(&CardSpec::numbered(seed)))
        .collect();
    let page = DynamicImage::ImageLuma8(render_page(&cards, 100, 50, 40));
    let mut form = synthetic_form();
    form.layout = FormConfig::yedam().layout;

    c.bench_function("grade_page (three cards)", |b| {
        b.iter(|| black_box(grade_page(black_box(page.clone()), &form)));
    });
}

criterion_group!(
    benches,
    bench_alignment,
    bench_detection,
    bench_grade_card,
    bench_grade_page
);
criterion_main!(benches);
