// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Form configuration: one versioned, immutable bundle per supported form type.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MarksheetError, Result};

/// Closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f32,
    pub max: f32,
}

impl Band {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    fn check(&self, what: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(MarksheetError::InvalidConfig(format!(
                "{what}: band [{}, {}] is empty or not finite",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

// -- Segmentation -------------------------------------------------------------

/// How a multi-card page is split into card regions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentationStrategy {
    /// Minimum of the smoothed row profile inside each gutter band.
    ProjectionProfile {
        /// One band per gutter, as fractions of the page height.
        gutter_bands: Vec<Band>,
        /// Moving-average window in rows.
        smoothing_window: usize,
        /// A band minimum above `ratio * band mean` counts as ambiguous.
        ambiguity_ratio: f32,
    },
    /// Split at large vertical gaps between detected candidates.
    CandidateGaps { min_gap: u32 },
    /// Always split into equal-height strips.
    #[default]
    EqualStrips,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub expected_card_count: usize,
    pub segmentation: SegmentationStrategy,
    /// Rows trimmed from the inner top/bottom edge of each region.
    pub card_padding: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            expected_card_count: 1,
            segmentation: SegmentationStrategy::default(),
            card_padding: 10,
        }
    }
}

// -- Alignment ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Rectify the whole page before segmentation.
    pub align_page: bool,
    /// Rectify each card crop again after segmentation.
    pub align_cards: bool,
    /// Working height for quadrilateral search; taller images are downscaled.
    pub working_height: u32,
    /// Minimum quadrilateral area as a fraction of the image area.
    pub min_area_fraction: f32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Chebyshev radius of the gap-closing kernel (2 = 5x5).
    pub close_radius: u8,
    /// Number of largest contours tried.
    pub max_contours: usize,
    /// Polygon approximation tolerance as a fraction of the perimeter.
    pub approx_epsilon: f32,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            align_page: true,
            align_cards: false,
            working_height: 1000,
            min_area_fraction: 0.10,
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 200.0,
            close_radius: 2,
            max_contours: 10,
            approx_epsilon: 0.02,
        }
    }
}

// -- Candidate detection ------------------------------------------------------

/// Local threshold flavour for [`ThresholdStrategy::Adaptive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveMethod {
    Mean,
    Gaussian,
}

/// Binarization used before contour extraction. Mark pixels become 255.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdStrategy {
    /// Pixels at or below `level` are marks.
    Fixed { level: u8 },
    /// Otsu's bimodal threshold.
    Automatic,
    /// Pixels at or below `local mean - bias` are marks.
    Adaptive {
        block_radius: u32,
        bias: i32,
        method: AdaptiveMethod,
    },
}

/// Morphological cleanup applied to the binary image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MorphologyStep {
    None,
    /// Erase thin ruling lines.
    Open { radius: u8 },
    /// Repair thin outlines that adaptive thresholding breaks up.
    Dilate { radius: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub threshold: ThresholdStrategy,
    pub morphology: MorphologyStep,
    /// Accepted bounding-box width and height, in pixels.
    pub size_band: Band,
    /// Accepted width / height ratio.
    pub aspect_band: Band,
    /// Minimum enclosed area, in square pixels.
    pub min_area: f32,
    /// Candidates whose centres are closer than this are one shape.
    pub dedup_distance: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdStrategy::Fixed { level: 200 },
            morphology: MorphologyStep::Open { radius: 1 },
            size_band: Band::new(8.0, 100.0),
            aspect_band: Band::new(0.4, 2.5),
            min_area: 20.0,
            dedup_distance: 5.0,
        }
    }
}

// -- Grid inference -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Candidates left of `fraction * width` belong to the registration grid.
    pub registration_fraction: f32,
    /// Gap between sorted x-centres that starts a new column.
    pub column_gap: f32,
    /// Gap between sorted y-centres that starts a new row.
    pub row_gap: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            registration_fraction: 0.25,
            column_gap: 20.0,
            row_gap: 15.0,
        }
    }
}

// -- Grading ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationLayout {
    pub column_count: usize,
    /// Digit rows per column (at most 10).
    pub row_count: usize,
    /// Max horizontal distance from a column peak, in pixels.
    pub column_tolerance: f32,
}

impl Default for RegistrationLayout {
    fn default() -> Self {
        Self {
            column_count: 5,
            row_count: 10,
            column_tolerance: 15.0,
        }
    }
}

/// How question cells are located on the inferred grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStrategy {
    /// Map each detected, filled candidate to its nearest (block, row, choice).
    CandidateMapping,
    /// Sample every theoretical cell whether or not a candidate was found.
    GridSampling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionLayout {
    pub strategy: QuestionStrategy,
    /// Start of each choice block, in registration column steps from the
    /// registration origin.
    pub block_offsets: Vec<f32>,
    /// Distance between adjacent choices, in column steps.
    pub choice_spacing: f32,
    pub questions_per_block: usize,
    pub choices_per_block: usize,
    /// Half side of the square sampling window used by `GridSampling`.
    pub cell_half_size: u32,
    /// Slack around a block when mapping candidates, in column steps.
    pub block_margin: f32,
    /// Candidates nearer than this many column steps to the origin are
    /// registration bubbles.
    pub min_column_offset: f32,
}

impl Default for QuestionLayout {
    fn default() -> Self {
        Self {
            strategy: QuestionStrategy::CandidateMapping,
            block_offsets: vec![7.5, 11.0, 14.5, 18.2],
            choice_spacing: 0.5,
            questions_per_block: 10,
            choices_per_block: 5,
            cell_half_size: 12,
            block_margin: 1.5,
            min_column_offset: 6.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkingConfig {
    /// A cell is filled when its darkness score exceeds this.
    pub threshold: f32,
    /// Fraction of a candidate's box (around its centre) that is sampled.
    pub candidate_sample_fraction: f32,
}

impl Default for MarkingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.35,
            candidate_sample_fraction: 0.5,
        }
    }
}

// -- Form bundle --------------------------------------------------------------

/// Upper bound on the grid sampling half side, in pixels.
pub const MAX_CELL_HALF_SIZE: u32 = 1024;

/// Every tunable for one form type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    pub name: String,
    pub version: u32,
    pub layout: LayoutConfig,
    pub alignment: AlignmentConfig,
    pub detection: DetectionConfig,
    pub grid: GridConfig,
    pub registration: RegistrationLayout,
    pub questions: QuestionLayout,
    pub marking: MarkingConfig,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self::single_card()
    }
}

impl FormConfig {
    /// Three cards per page, five-digit registration, four blocks of ten
    /// five-choice questions.
    pub fn yedam() -> Self {
        Self {
            name: "yedam".into(),
            version: 1,
            layout: LayoutConfig {
                expected_card_count: 3,
                segmentation: SegmentationStrategy::ProjectionProfile {
                    gutter_bands: vec![Band::new(0.30, 0.45), Band::new(0.60, 0.75)],
                    smoothing_window: 50,
                    ambiguity_ratio: 0.85,
                },
                card_padding: 10,
            },
            alignment: AlignmentConfig {
                align_cards: true,
                ..AlignmentConfig::default()
            },
            detection: DetectionConfig {
                threshold: ThresholdStrategy::Adaptive {
                    block_radius: 10,
                    bias: 15,
                    method: AdaptiveMethod::Gaussian,
                },
                morphology: MorphologyStep::Dilate { radius: 1 },
                size_band: Band::new(10.0, 100.0),
                aspect_band: Band::new(0.7, 1.3),
                ..DetectionConfig::default()
            },
            grid: GridConfig::default(),
            registration: RegistrationLayout::default(),
            questions: QuestionLayout {
                strategy: QuestionStrategy::GridSampling,
                ..QuestionLayout::default()
            },
            marking: MarkingConfig {
                threshold: 0.30,
                ..MarkingConfig::default()
            },
        }
    }

    /// One card per image, fixed threshold and candidate mapping.
    pub fn single_card() -> Self {
        Self {
            name: "single-card".into(),
            version: 1,
            layout: LayoutConfig::default(),
            alignment: AlignmentConfig::default(),
            detection: DetectionConfig::default(),
            grid: GridConfig::default(),
            registration: RegistrationLayout::default(),
            questions: QuestionLayout::default(),
            marking: MarkingConfig::default(),
        }
    }

    /// Parse and validate a single form from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let form: FormConfig = serde_json::from_str(json)?;
        form.validate()?;
        Ok(form)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> {
            Err(MarksheetError::InvalidConfig(format!("{}: {msg}", self.name)))
        };

        if self.name.trim().is_empty() {
            return Err(MarksheetError::InvalidConfig("form name is empty".into()));
        }
        if self.layout.expected_card_count == 0 {
            return invalid("expected_card_count must be at least 1".into());
        }
        match &self.layout.segmentation {
            SegmentationStrategy::ProjectionProfile {
                gutter_bands,
                smoothing_window,
                ambiguity_ratio,
            } => {
                for (i, band) in gutter_bands.iter().enumerate() {
                    band.check(&format!("gutter band {i}"))?;
                    if band.min < 0.0 || band.max > 1.0 {
                        return invalid(format!("gutter band {i} must lie within [0, 1]"));
                    }
                }
                if *smoothing_window == 0 {
                    return invalid("smoothing_window must be at least 1".into());
                }
                if !(*ambiguity_ratio > 0.0 && *ambiguity_ratio <= 1.0) {
                    return invalid("ambiguity_ratio must be in (0, 1]".into());
                }
            }
            SegmentationStrategy::CandidateGaps { min_gap } => {
                if *min_gap == 0 {
                    return invalid("min_gap must be positive".into());
                }
            }
            SegmentationStrategy::EqualStrips => {}
        }

        let a = &self.alignment;
        if a.working_height == 0 || a.max_contours == 0 {
            return invalid("working_height and max_contours must be positive".into());
        }
        if !(a.min_area_fraction > 0.0 && a.min_area_fraction < 1.0) {
            return invalid("min_area_fraction must be in (0, 1)".into());
        }
        if !(a.approx_epsilon > 0.0) || !(a.blur_sigma > 0.0) || a.canny_low > a.canny_high {
            return invalid("approx_epsilon and blur_sigma must be positive, canny_low <= canny_high".into());
        }

        let d = &self.detection;
        d.size_band.check("size_band")?;
        d.aspect_band.check("aspect_band")?;
        if d.aspect_band.max <= 0.0 {
            return invalid("aspect_band must admit positive ratios".into());
        }
        if let ThresholdStrategy::Adaptive { block_radius, .. } = d.threshold {
            if block_radius == 0 {
                return invalid("adaptive block_radius must be positive".into());
            }
        }

        let g = &self.grid;
        if !(g.registration_fraction > 0.0 && g.registration_fraction <= 1.0) {
            return invalid("registration_fraction must be in (0, 1]".into());
        }
        if !(g.column_gap > 0.0 && g.row_gap > 0.0) {
            return invalid("column_gap and row_gap must be positive".into());
        }

        let r = &self.registration;
        if r.row_count == 0 || r.row_count > 10 {
            return invalid("registration row_count must be in 1..=10".into());
        }

        let q = &self.questions;
        if q.choices_per_block == 0 || q.choices_per_block > u8::MAX as usize {
            return invalid("choices_per_block must be in 1..=255".into());
        }
        if !(q.choice_spacing > 0.0) {
            return invalid("choice_spacing must be positive".into());
        }
        if q.strategy == QuestionStrategy::GridSampling && q.cell_half_size == 0 {
            return invalid("cell_half_size must be positive for grid sampling".into());
        }
        if q.cell_half_size as f32 > d.size_band.max || q.cell_half_size > MAX_CELL_HALF_SIZE {
            return invalid(format!(
                "cell_half_size must be at most size_band.max and {MAX_CELL_HALF_SIZE}"
            ));
        }

        let m = &self.marking;
        if !(m.threshold > 0.0 && m.threshold < 1.0) {
            return invalid("marking threshold must be in (0, 1)".into());
        }
        if !(m.candidate_sample_fraction > 0.0 && m.candidate_sample_fraction <= 1.0) {
            return invalid("candidate_sample_fraction must be in (0, 1]".into());
        }
        Ok(())
    }
}

// -- Registry -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FormFile {
    forms: Vec<FormConfig>,
}

/// Named form configurations, validated once at load time.
#[derive(Debug, Clone, Default)]
pub struct FormRegistry {
    forms: BTreeMap<String, FormConfig>,
}

impl FormRegistry {
    /// Registry holding the built-in presets.
    pub fn builtin() -> Self {
        let mut forms = BTreeMap::new();
        for form in [FormConfig::yedam(), FormConfig::single_card()] {
            forms.insert(form.name.clone(), form);
        }
        Self { forms }
    }

    /// Parse `{"forms": [...]}`. Later entries replace earlier ones with the
    /// same name.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: FormFile = serde_json::from_str(json)?;
        let mut registry = Self::default();
        for form in file.forms {
            registry.insert(form)?;
        }
        Ok(registry)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Validate and add a form, replacing any form with the same name.
    pub fn insert(&mut self, form: FormConfig) -> Result<()> {
        form.validate()?;
        self.forms.insert(form.name.clone(), form);
        Ok(())
    }

    /// Add every form from `other`, replacing same-named entries.
    pub fn merge(&mut self, other: FormRegistry) {
        self.forms.extend(other.forms);
    }

    pub fn get(&self, name: &str) -> Result<&FormConfig> {
        self.forms
            .get(name)
            .ok_or_else(|| MarksheetError::UnknownForm(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.forms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_presets_validate() {
        let registry = FormRegistry::builtin();
        assert_eq!(registry.len(), 2);
        for name in ["yedam", "single-card"] {
            registry.get(name).expect("preset").validate().expect("valid");
        }
    }

    #[test]
    fn unknown_form_is_an_error() {
        let registry = FormRegistry::builtin();
        assert!(matches!(
            registry.get("ss-99"),
            Err(MarksheetError::UnknownForm(name)) if name == "ss-99"
        ));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let form = FormConfig::from_json_str(
            r#"{
                "name": "custom",
                "version": 2,
                "detection": { "threshold": { "kind": "adaptive", "block_radius": 7, "bias": 10, "method": "mean" } },
                "marking": { "threshold": 0.32 }
            }"#,
        )
        .expect("parse");
        assert_eq!(form.version, 2);
        assert_eq!(
            form.detection.threshold,
            ThresholdStrategy::Adaptive {
                block_radius: 7,
                bias: 10,
                method: AdaptiveMethod::Mean
            }
        );
        assert_eq!(form.detection.dedup_distance, 5.0);
        assert_eq!(form.marking.candidate_sample_fraction, 0.5);
        assert_eq!(form.questions.block_offsets.len(), 4);
    }

    #[test]
    fn out_of_range_marking_threshold_is_rejected() {
        let mut form = FormConfig::single_card();
        form.marking.threshold = 1.5;
        assert!(matches!(form.validate(), Err(MarksheetError::InvalidConfig(_))));
    }

    #[test]
    fn oversized_sampling_window_is_rejected() {
        let mut form = FormConfig::yedam();
        form.questions.cell_half_size = 101;
        assert!(matches!(form.validate(), Err(MarksheetError::InvalidConfig(_))));

        form.detection.size_band = Band::new(10.0, 1.0e9);
        form.questions.cell_half_size = u32::MAX;
        assert!(matches!(form.validate(), Err(MarksheetError::InvalidConfig(_))));

        form.questions.cell_half_size = 100;
        assert!(form.validate().is_ok());
    }

    #[test]
    fn gutter_band_outside_page_is_rejected() {
        let mut form = FormConfig::yedam();
        form.layout.segmentation = SegmentationStrategy::ProjectionProfile {
            gutter_bands: vec![Band::new(0.9, 1.2)],
            smoothing_window: 50,
            ambiguity_ratio: 0.85,
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn registry_round_trips_through_a_file() {
        let yedam = serde_json::to_string(&FormConfig::yedam()).expect("serialize");
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"forms": [{yedam}, {{"name": "ss-03"}}]}}"#).expect("write");

        let registry = FormRegistry::from_json_file(file.path()).expect("load");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["ss-03", "yedam"]);
        assert_eq!(registry.get("yedam").expect("yedam"), &FormConfig::yedam());
        assert_eq!(registry.get("ss-03").expect("ss-03").layout.expected_card_count, 1);
    }

    #[test]
    fn registry_rejects_invalid_entries() {
        let json = r#"{"forms": [{"name": "broken", "layout": {"expected_card_count": 0}}]}"#;
        assert!(matches!(
            FormRegistry::from_json_str(json),
            Err(MarksheetError::InvalidConfig(_))
        ));
    }
}
