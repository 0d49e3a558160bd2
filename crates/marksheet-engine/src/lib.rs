// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// marksheet-engine — The optical mark recognition pipeline.
//
// Turns a raw page image into structured answers: perspective correction
// (align), splitting multi-card pages (segment), bubble candidate extraction
// (detect), grid recovery from sparse detections (grid), per-cell darkness
// scoring (classify), and the orchestration that ties them together (grade).

pub mod align;
pub mod classify;
pub mod detect;
pub mod grade;
pub mod grid;
pub mod image;
pub mod region;
pub mod segment;

#[cfg(any(test, feature = "synthetic"))]
pub mod synthetic;

// Re-export the entry points so callers can use `marksheet_engine::grade_page` etc.
pub use align::{AlignedImage, align};
pub use classify::classify_cell;
pub use detect::{detect, detect_candidates};
pub use grade::{grade_card, grade_page, grade_page_report};
pub use grid::infer_grid;
pub use region::CardRegion;
pub use segment::{Segmentation, segment};
