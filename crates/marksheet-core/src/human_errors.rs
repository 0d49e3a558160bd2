// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the upload layer.
//
// Every technical error is mapped to a plain message with a clear suggestion.
// Severity tells the caller whether to ask for a new scan, fix the form
// setup, or give up.

use crate::error::MarksheetError;

/// Severity of an error from the uploader's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A better scan or photo will probably work.
    Rescan,
    /// The form configuration or answer key must be fixed by an operator.
    Configuration,
    /// Cannot be fixed by retrying (unreadable file, storage failure).
    Permanent,
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Short summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether re-uploading the same kind of input can help.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `MarksheetError` into a `HumanError` suitable for an upload
/// response.
pub fn humanize_error(err: &MarksheetError) -> HumanError {
    match err {
        MarksheetError::ImageDecode(detail) => HumanError {
            message: "We couldn't open this image.".into(),
            suggestion: format!("Upload a JPEG or PNG photo or scan of the answer sheet. ({detail})"),
            retriable: true,
            severity: Severity::Rescan,
        },

        MarksheetError::ImageEncode(detail) => HumanError {
            message: "We couldn't save the processed image.".into(),
            suggestion: format!("Try again later. ({detail})"),
            retriable: true,
            severity: Severity::Permanent,
        },

        MarksheetError::NoStructureDetected => HumanError {
            message: "No answer sheet was found in this image.".into(),
            suggestion: "Place the whole sheet flat on a dark surface, make sure it is in focus and well lit, then scan or photograph it again.".into(),
            retriable: true,
            severity: Severity::Rescan,
        },

        MarksheetError::InsufficientGridSignal { columns, rows } => HumanError {
            message: "The bubbles on this card couldn't be lined up.".into(),
            suggestion: format!(
                "Rescan the card so every bubble is visible. (found {columns} column(s), {rows} row(s))"
            ),
            retriable: true,
            severity: Severity::Rescan,
        },

        MarksheetError::UnknownForm(name) => HumanError {
            message: "This form type isn't set up.".into(),
            suggestion: format!("Choose one of the configured form types. (requested: {name})"),
            retriable: false,
            severity: Severity::Configuration,
        },

        MarksheetError::InvalidConfig(detail) => HumanError {
            message: "The form settings are invalid.".into(),
            suggestion: format!("Ask an administrator to check the form configuration. ({detail})"),
            retriable: false,
            severity: Severity::Configuration,
        },

        MarksheetError::InvalidAnswerKey(detail) => HumanError {
            message: "The answer key is invalid.".into(),
            suggestion: format!("Check that questions and choices are numbered from 1. ({detail})"),
            retriable: false,
            severity: Severity::Configuration,
        },

        MarksheetError::Io(io_err) => HumanError {
            message: "A file couldn't be read or written.".into(),
            suggestion: format!("Check the file exists and is readable. ({io_err})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        MarksheetError::Serialization(json_err) => HumanError {
            message: "A settings file is malformed.".into(),
            suggestion: format!("Fix the JSON syntax and try again. ({json_err})"),
            retriable: false,
            severity: Severity::Configuration,
        },
    }
}
