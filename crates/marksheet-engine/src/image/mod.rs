// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — page loading, binarization strategies and morphological
// cleanup shared by the pipeline stages.

pub mod binarize;
pub mod loader;

pub use binarize::{apply_morphology, binarize, otsu_bright, otsu_inverted, threshold_dark};
pub use loader::{encode_png, load_page, open_page};
