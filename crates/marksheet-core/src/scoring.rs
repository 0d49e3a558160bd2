// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer keys and scoring of graded cards against them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MarksheetError, Result};
use crate::types::CardResult;

/// Correct choice (1-based) per question number (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnswerKey {
    pub answers: BTreeMap<u32, u8>,
}

impl AnswerKey {
    pub fn new(answers: BTreeMap<u32, u8>) -> Result<Self> {
        let key = Self { answers };
        key.validate()?;
        Ok(key)
    }

    /// Parse `{"answers": {"1": 3, "2": 1, ...}}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let key: AnswerKey = serde_json::from_str(json)?;
        key.validate()?;
        Ok(key)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if let Some((q, c)) = self.answers.iter().find(|(q, c)| **q == 0 || **c == 0) {
            return Err(MarksheetError::InvalidAnswerKey(format!(
                "question {q} -> choice {c}: numbering is 1-based"
            )));
        }
        Ok(())
    }
}

/// How one keyed question was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionOutcome {
    Correct,
    Incorrect,
    Unanswered,
    /// More than one choice selected; never counted as correct.
    Multiple,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub unanswered: usize,
    pub multiple: usize,
    pub per_question: BTreeMap<u32, QuestionOutcome>,
}

impl ScoreSummary {
    /// Fraction of keyed questions answered correctly.
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f32 / self.total as f32
    }
}

/// Compare a card's answers against `key`. Only keyed questions count.
pub fn score_card(result: &CardResult, key: &AnswerKey) -> ScoreSummary {
    let mut summary = ScoreSummary {
        total: key.answers.len(),
        ..ScoreSummary::default()
    };
    for (&question, &expected) in &key.answers {
        let outcome = match result.answers.get(&question).map(Vec::as_slice) {
            None | Some([]) => QuestionOutcome::Unanswered,
            Some([only]) if *only == expected => QuestionOutcome::Correct,
            Some([_]) => QuestionOutcome::Incorrect,
            Some(_) => QuestionOutcome::Multiple,
        };
        match outcome {
            QuestionOutcome::Correct => summary.correct += 1,
            QuestionOutcome::Incorrect => summary.incorrect += 1,
            QuestionOutcome::Unanswered => summary.unanswered += 1,
            QuestionOutcome::Multiple => summary.multiple += 1,
        }
        summary.per_question.insert(question, outcome);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> AnswerKey {
        AnswerKey::from_json_str(r#"{"answers": {"1": 3, "2": 1, "3": 5, "4": 2}}"#)
            .expect("key")
    }

    #[test]
    fn outcomes_are_counted_per_question() {
        let mut result = CardResult::default();
        result.select(1, 3, 0.9);
        result.select(2, 4, 0.8);
        result.select(3, 5, 0.7);
        result.select(3, 1, 0.6);

        let summary = score_card(&result, &key());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.incorrect, 1);
        assert_eq!(summary.multiple, 1);
        assert_eq!(summary.unanswered, 1);
        assert_eq!(summary.per_question[&4], QuestionOutcome::Unanswered);
        assert!((summary.accuracy() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn zero_based_keys_are_rejected() {
        let err = AnswerKey::from_json_str(r#"{"answers": {"1": 0}}"#).unwrap_err();
        assert!(matches!(err, MarksheetError::InvalidAnswerKey(_)));
    }

    #[test]
    fn unkeyed_answers_are_ignored() {
        let mut result = CardResult::default();
        result.select(40, 2, 0.9);
        let summary = score_card(&result, &key());
        assert_eq!(summary.unanswered, 4);
    }
}
