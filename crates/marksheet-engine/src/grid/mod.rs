// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grid inference — recovers the regular bubble lattice of a card from a
// sparse, noisy set of detections.
//
// Candidates are split into a registration population (left part of the
// card) and a question population. Each population's x and y centres are
// clustered into peaks; origin and step of an axis come from its extreme
// peaks. Absent bubbles do not shift the result as long as the outermost
// rows and columns are present.

pub mod cluster;

use marksheet_core::config::GridConfig;
use marksheet_core::error::{MarksheetError, Result};
use marksheet_core::types::{Axis, GridModel, MarkCandidate, Point2, SubGrid};
use tracing::{debug, instrument};

pub use cluster::{PeakClustering, SequentialGap};

/// Infers grids with a pluggable clustering method.
#[derive(Debug, Clone, Default)]
pub struct GridInferencer<C = SequentialGap> {
    clustering: C,
}

impl GridInferencer<SequentialGap> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: PeakClustering> GridInferencer<C> {
    pub fn with_clustering(clustering: C) -> Self {
        Self { clustering }
    }

    /// Infer the registration grid and, when it has enough signal, the
    /// question grid of a `width x height` region.
    #[instrument(skip(self, candidates, config), fields(candidates = candidates.len()))]
    pub fn infer(
        &self,
        candidates: &[MarkCandidate],
        width: u32,
        height: u32,
        config: &GridConfig,
    ) -> Result<GridModel> {
        let split_x = config.registration_fraction * width as f32;
        let (registration, questions): (Vec<Point2>, Vec<Point2>) = candidates
            .iter()
            .map(MarkCandidate::center)
            .filter(|c| c.x >= 0.0 && c.y >= 0.0 && c.x < width as f32 && c.y < height as f32)
            .partition(|c| c.x < split_x);

        let registration = self
            .sub_grid(&registration, config)
            .map_err(|(columns, rows)| MarksheetError::InsufficientGridSignal { columns, rows })?;
        let questions = self.sub_grid(&questions, config).ok();

        debug!(
            x0 = registration.columns.origin,
            dx = registration.columns.step,
            y0 = registration.rows.origin,
            dy = registration.rows.step,
            question_grid = questions.is_some(),
            "Grid inferred"
        );
        Ok(GridModel {
            registration,
            questions,
        })
    }

    /// Column and row axes for one population. On failure returns the
    /// number of column and row peaks found.
    pub fn sub_grid(
        &self,
        centers: &[Point2],
        config: &GridConfig,
    ) -> std::result::Result<SubGrid, (usize, usize)> {
        let xs: Vec<f32> = centers.iter().map(|c| c.x).collect();
        let ys: Vec<f32> = centers.iter().map(|c| c.y).collect();
        let column_peaks = self.clustering.peaks(&xs, config.column_gap);
        let row_peaks = self.clustering.peaks(&ys, config.row_gap);
        let counts = (column_peaks.len(), row_peaks.len());
        match (Axis::from_peaks(column_peaks), Axis::from_peaks(row_peaks)) {
            (Some(columns), Some(rows)) => Ok(SubGrid { columns, rows }),
            _ => Err(counts),
        }
    }
}

/// Infer a card's grid with sequential-gap clustering.
pub fn infer_grid(
    candidates: &[MarkCandidate],
    width: u32,
    height: u32,
    config: &GridConfig,
) -> Result<GridModel> {
    GridInferencer::new().infer(candidates, width, height, config)
}
