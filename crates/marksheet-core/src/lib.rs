// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Marksheet — Core types, form configuration and error definitions shared
// across all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod scoring;
pub mod types;

pub use config::{FormConfig, FormRegistry};
pub use error::{MarksheetError, Result};
pub use scoring::{AnswerKey, QuestionOutcome, ScoreSummary, score_card};
pub use types::*;
