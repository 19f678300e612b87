// ============================================================
// Layer 7 — Rendering
// ============================================================
// Turns a normalized tensor and its predicted labels into the
// two artifacts a user looks at:
//
//   <output_root>/<job id>/preview.png     mid-depth slice, five panels + legend
//   <output_root>/<job id>/animation.gif   looping sweep through depth
//
//   palette.rs   — label colours and per-slice grey stretching
//   preview.rs   — static figure drawn with plotters
//   animation.rs — frame composition (image) and GIF encoding (gif)
//
// Either artifact failing fails the job with VisualizationError.

pub mod palette;
pub mod preview;
pub mod animation;

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::error::VisualizationError;
use crate::domain::volume::{LabelVolume, ModalityTensor};

pub const PREVIEW_FILE: &str = "preview.png";
pub const ANIMATION_FILE: &str = "animation.gif";

/// Where the artifacts of one job were written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifacts {
    pub preview:       PathBuf,
    pub animation:     PathBuf,
    pub preview_slice: usize,
    pub frame_count:   usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentationVisualizer {
    panel_px: u32,
}

impl SegmentationVisualizer {
    pub fn new(panel_px: u32) -> Self {
        Self { panel_px: panel_px.max(16) }
    }

    /// Write preview.png and animation.gif into `out_dir`.
    pub fn render(
        &self,
        tensor:  &ModalityTensor,
        labels:  &LabelVolume,
        out_dir: &Path,
    ) -> Result<RenderedArtifacts, VisualizationError> {
        fs::create_dir_all(out_dir)
            .map_err(|source| VisualizationError::Io { path: out_dir.to_path_buf(), source })?;

        let preview = out_dir.join(PREVIEW_FILE);
        let preview_slice = preview::write_preview(&preview, tensor, labels, self.panel_px)?;

        let animation = out_dir.join(ANIMATION_FILE);
        let frame_count = animation::write_animation(&animation, tensor, labels)?;

        tracing::info!(
            "Rendered preview (slice {}) and {}-frame animation into '{}'",
            preview_slice,
            frame_count,
            out_dir.display()
        );
        Ok(RenderedArtifacts { preview, animation, preview_slice, frame_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    #[test]
    fn test_render_writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("job-1");

        let tensor = ModalityTensor::from_array(Array4::from_elem((4, 6, 6, 6), 0.5)).unwrap();
        let labels = LabelVolume::new(Array3::from_elem((6, 6, 6), 2)).unwrap();

        let art = SegmentationVisualizer::new(32).render(&tensor, &labels, &out).unwrap();
        assert!(art.preview.is_file());
        assert!(art.animation.is_file());
        assert_eq!(art.preview_slice, 3);
        assert_eq!(art.frame_count, 30);
    }
}
