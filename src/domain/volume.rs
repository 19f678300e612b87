// ============================================================
// Layer 3 — Volume Types
// ============================================================
// Shapes used throughout the pipeline:
//
//   ImageVolume     [X, Y, Z]        f32, one per modality
//   ModalityTensor  [4, X, Y, Z]     f32, channels in Modality::ALL order
//   LabelVolume     [X, Y, Z]        u8, one class index per voxel
//
// The depth axis is the last one (Z). Slices shown to users
// are taken along it.

use ndarray::{Array3, Array4, ArrayView3, ArrayViewMut3, Axis};
use serde::{Deserialize, Serialize};

use crate::domain::modality::Modality;

pub type ImageVolume = Array3<f32>;

/// Number of segmentation classes produced by the model
pub const NUM_CLASSES: usize = 4;

/// Index of the depth axis in an ImageVolume / LabelVolume
pub const DEPTH_AXIS: usize = 2;

// ─── SegClass ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegClass {
    Background,
    NecroticCore,
    Edema,
    EnhancingTumor,
}

impl SegClass {
    pub const ALL: [SegClass; NUM_CLASSES] = [
        SegClass::Background,
        SegClass::NecroticCore,
        SegClass::Edema,
        SegClass::EnhancingTumor,
    ];

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Human readable name used in legends
    pub fn name(self) -> &'static str {
        match self {
            SegClass::Background     => "Background",
            SegClass::NecroticCore   => "Necrotic core",
            SegClass::Edema          => "Edema",
            SegClass::EnhancingTumor => "Enhancing tumor",
        }
    }
}

// ─── ModalityTensor ───────────────────────────────────────────────────────────
/// Four co-registered volumes stacked along a leading channel axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ModalityTensor {
    data: Array4<f32>,
}

impl ModalityTensor {
    /// Wrap an existing `[C, X, Y, Z]` array.
    /// Returns None unless C is exactly 4.
    pub fn from_array(data: Array4<f32>) -> Option<Self> {
        (data.len_of(Axis(0)) == Modality::COUNT).then_some(Self { data })
    }

    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn channel(&self, c: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(0), c)
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = ArrayViewMut3<'_, f32>> {
        self.data.axis_iter_mut(Axis(0))
    }

    /// Spatial shape (X, Y, Z)
    pub fn spatial_shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[1], s[2], s[3]]
    }
}

// ─── LabelVolume ──────────────────────────────────────────────────────────────
/// Per-voxel class indices in [0, NUM_CLASSES).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVolume {
    labels: Array3<u8>,
}

impl LabelVolume {
    /// Wrap raw labels. Out-of-range indices are rejected.
    pub fn new(labels: Array3<u8>) -> Option<Self> {
        labels
            .iter()
            .all(|&l| (l as usize) < NUM_CLASSES)
            .then_some(Self { labels })
    }

    pub fn labels(&self) -> &Array3<u8> {
        &self.labels
    }

    pub fn shape(&self) -> [usize; 3] {
        let s = self.labels.shape();
        [s[0], s[1], s[2]]
    }

    pub fn depth(&self) -> usize {
        self.labels.len_of(Axis(DEPTH_AXIS))
    }

    /// Voxel count per class, indexed by class
    pub fn class_counts(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0usize; NUM_CLASSES];
        for &l in self.labels.iter() {
            counts[l as usize] += 1;
        }
        counts
    }
}
