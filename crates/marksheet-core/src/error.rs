// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Marksheet.

use thiserror::Error;

/// Top-level error type for all Marksheet operations.
///
/// Only failures that abort a whole unit of work live here. Degraded paths
/// (alignment passthrough, equal-split segmentation, empty candidate sets,
/// out-of-bounds sampling windows) are reported through outcome values and
/// never surface as errors.
#[derive(Debug, Error)]
pub enum MarksheetError {
    // -- Image errors --
    #[error("failed to decode page image: {0}")]
    ImageDecode(String),

    #[error("failed to encode image: {0}")]
    ImageEncode(String),

    // -- Configuration errors --
    #[error("invalid form configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown form type: {0}")]
    UnknownForm(String),

    #[error("invalid answer key: {0}")]
    InvalidAnswerKey(String),

    // -- Recognition errors --
    #[error("insufficient grid signal: {columns} column peak(s), {rows} row peak(s); need at least 2 of each")]
    InsufficientGridSignal { columns: usize, rows: usize },

    #[error("document alignment could not detect any structure")]
    NoStructureDetected,

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MarksheetError>;
