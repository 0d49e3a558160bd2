// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// 1-D peak clustering for grid recovery.

/// Collapses a set of 1-D coordinates into cluster centres ("peaks").
pub trait PeakClustering: Send + Sync {
    /// Peaks of `values`, ascending. `gap` is the spacing that separates two
    /// clusters.
    fn peaks(&self, values: &[f32], gap: f32) -> Vec<f32>;
}

/// Sort, then start a new cluster whenever the distance to the previous
/// value exceeds `gap`. Each peak is its cluster's mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialGap;

impl PeakClustering for SequentialGap {
    fn peaks(&self, values: &[f32], gap: f32) -> Vec<f32> {
        let mut sorted: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f32::total_cmp);

        let mut peaks = Vec::new();
        let mut cluster: Vec<f32> = Vec::new();
        for value in sorted {
            if let Some(last) = cluster.last() {
                if value - last > gap {
                    peaks.push(mean(&cluster));
                    cluster.clear();
                }
            }
            cluster.push(value);
        }
        if !cluster.is_empty() {
            peaks.push(mean(&cluster));
        }
        peaks
    }
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_peaks() {
        assert!(SequentialGap.peaks(&[], 10.0).is_empty());
    }

    #[test]
    fn clusters_are_averaged_in_order() {
        let peaks = SequentialGap.peaks(&[102.0, 40.0, 41.0, 100.0, 39.0, 101.0], 20.0);
        assert_eq!(peaks, vec![40.0, 101.0]);
    }

    #[test]
    fn gap_equal_to_threshold_stays_in_cluster() {
        let peaks = SequentialGap.peaks(&[0.0, 15.0, 30.0], 15.0);
        assert_eq!(peaks, vec![15.0]);
    }

    #[test]
    fn chained_values_merge() {
        // Each step is small even though the ends are far apart.
        let values: Vec<f32> = (0..10).map(|i| i as f32 * 5.0).collect();
        assert_eq!(SequentialGap.peaks(&values, 6.0).len(), 1);
    }
}
