// ============================================================
// Layer 6 — Region Metrics
// ============================================================
// Fills the `metrics` slot of a completed job with the share
// of the volume each tumour region occupies in the prediction.
//
// Regions are nested unions of label classes:
//
//   whole_tumor      {1, 2, 3}   necrotic core + edema + enhancing
//   tumor_core       {1, 3}      necrotic core + enhancing
//   enhancing_tumor  {3}
//
// These describe the prediction itself. They are NOT accuracy
// scores: there is no ground truth to compare against.
//
// Example payload:
//   { "enhancing_tumor": 0.0012, "tumor_core": 0.0031, "whole_tumor": 0.0175 }

use crate::domain::job::Metrics;
use crate::domain::traits::MetricsProvider;
use crate::domain::volume::{LabelVolume, SegClass};

/// (metric key, classes counted)
const REGIONS: [(&str, &[SegClass]); 3] = [
    ("whole_tumor",     &[SegClass::NecroticCore, SegClass::Edema, SegClass::EnhancingTumor]),
    ("tumor_core",      &[SegClass::NecroticCore, SegClass::EnhancingTumor]),
    ("enhancing_tumor", &[SegClass::EnhancingTumor]),
];

/// Voxel fraction of each tumour region.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegionFractions;

impl MetricsProvider for RegionFractions {
    fn compute(&self, labels: &LabelVolume) -> Metrics {
        let counts = labels.class_counts();
        let total  = counts.iter().sum::<usize>();

        REGIONS
            .iter()
            .map(|(name, classes)| {
                let voxels: usize = classes.iter().map(|c| counts[c.index() as usize]).sum();
                let fraction = if total == 0 { 0.0 } else { voxels as f64 / total as f64 };
                (name.to_string(), fraction)
            })
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_nested_regions() {
        // 10 voxels: 5 background, 1 necrotic, 2 edema, 2 enhancing
        let raw = Array3::from_shape_vec((10, 1, 1), vec![0, 0, 0, 0, 0, 1, 2, 2, 3, 3]).unwrap();
        let m = RegionFractions.compute(&LabelVolume::new(raw).unwrap());
        assert_eq!(m["whole_tumor"], 0.5);
        assert_eq!(m["tumor_core"], 0.3);
        assert_eq!(m["enhancing_tumor"], 0.2);
    }

    #[test]
    fn test_all_background_is_zero() {
        let raw = Array3::<u8>::zeros((4, 4, 4));
        let m = RegionFractions.compute(&LabelVolume::new(raw).unwrap());
        assert_eq!(m.len(), 3);
        assert!(m.values().all(|&v| v == 0.0));
    }
}
