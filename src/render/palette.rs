// ============================================================
// Layer 7 — Colours and Slice Stretching
// ============================================================
// Shared by the preview and the animation:
//
//   label colours   0 black, 1 red, 2 yellow, 3 green
//   intensity       each 2-D slice stretched to 0..=255 on its own
//
// Per-slice stretching makes every frame use the full grey
// range even where the tissue is faint near the volume edge.

use ndarray::{Array2, ArrayView2};

use crate::domain::volume::{SegClass, NUM_CLASSES};

/// RGB per class, indexed by label value
pub const PALETTE: [[u8; 3]; NUM_CLASSES] = [
    [0, 0, 0],
    [255, 0, 0],
    [255, 255, 0],
    [0, 255, 0],
];

pub fn class_rgb(class: SegClass) -> [u8; 3] {
    PALETTE[class.index() as usize]
}

/// Colour for a raw label value; out-of-range values render black.
pub fn label_rgb(label: u8) -> [u8; 3] {
    PALETTE.get(label as usize).copied().unwrap_or(PALETTE[0])
}

/// Min-max stretch a slice to 8-bit grey. A flat slice is all black.
pub fn stretch_to_u8(slice: ArrayView2<'_, f32>) -> Array2<u8> {
    let (min, max) = slice
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;

    if !(range.is_finite() && range > 0.0) {
        return Array2::zeros(slice.raw_dim());
    }
    slice.mapv(|v| (((v - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8)
}
