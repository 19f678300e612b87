// ============================================================
// Layer 7 — Static Preview
// ============================================================
// Renders preview.png: the mid-depth slice of every modality
// next to the predicted labels, plus a colour legend.
//
//   ┌─────────────┬─────────────┬─────────────┬─────────────┬──────────────────┐
//   │ T1 (z=77)   │ T1c (z=77)  │ T2 (z=77)   │ FLAIR (z=77)│ Segmentation ... │
//   │   grey      │   grey      │   grey      │   grey      │   palette        │
//   ├─────────────┴─────────────┴─────────────┴─────────────┴──────────────────┤
//   │ ■ Background  ■ Necrotic core  ■ Edema  ■ Enhancing tumor                │
//   └──────────────────────────────────────────────────────────────────────────┘
//
// Slices are resampled nearest-neighbour into square panels.
//
// Reference: plotters (BitMapBackend, DrawingArea)

use ndarray::{Array2, ArrayView2, Axis};
use plotters::prelude::*;
use std::path::Path;

use crate::domain::error::VisualizationError;
use crate::domain::modality::Modality;
use crate::domain::volume::{LabelVolume, ModalityTensor, SegClass, DEPTH_AXIS};
use crate::render::palette::{class_rgb, label_rgb, stretch_to_u8};

const ARTIFACT: &str = "preview";
const TITLE_BAND_PX: u32 = 30;
const LEGEND_BAND_PX: u32 = 40;
const SWATCH_PX: i32 = 16;

/// The slice shown in the preview: the middle of the depth axis
pub fn preview_slice(depth: usize) -> usize {
    depth / 2
}

/// Write the five-panel preview to `path`. Returns the slice index used.
pub fn write_preview(
    path:     &Path,
    tensor:   &ModalityTensor,
    labels:   &LabelVolume,
    panel_px: u32,
) -> Result<usize, VisualizationError> {
    let depth = labels.depth();
    if depth == 0 {
        return Err(VisualizationError::EmptyVolume);
    }
    if tensor.spatial_shape() != labels.shape() {
        return Err(render_err(format!(
            "tensor {:?} does not match labels {:?}",
            tensor.spatial_shape(),
            labels.shape()
        )));
    }
    let z = preview_slice(depth);

    let panel_count = (Modality::COUNT + 1) as u32;
    let size = (panel_px * panel_count, panel_px + TITLE_BAND_PX + LEGEND_BAND_PX);
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let (top, legend) = root.split_vertically(panel_px + TITLE_BAND_PX);
    let panels = top.split_evenly((1, panel_count as usize));

    // ── Step 1: modality panels ──────────────────────────────────────────────
    for (modality, area) in Modality::ALL.iter().zip(&panels) {
        let grey  = stretch_to_u8(tensor.channel(modality.channel()).index_axis_move(Axis(DEPTH_AXIS), z));
        let title = format!("{modality} (slice {z})");
        let area  = area.titled(&title, ("sans-serif", 16.0)).map_err(render_err)?;
        draw_slice(&area, grey.view(), |v| [v, v, v])?;
    }

    // ── Step 2: label panel ──────────────────────────────────────────────────
    let label_slice: Array2<u8> = labels.labels().index_axis(Axis(DEPTH_AXIS), z).to_owned();
    let area = panels[Modality::COUNT]
        .titled(&format!("Segmentation (slice {z})"), ("sans-serif", 16.0))
        .map_err(render_err)?;
    draw_slice(&area, label_slice.view(), label_rgb)?;

    // ── Step 3: legend ───────────────────────────────────────────────────────
    let mut x = 10;
    let y = (LEGEND_BAND_PX as i32 - SWATCH_PX) / 2;
    for class in SegClass::ALL {
        let [r, g, b] = class_rgb(class);
        legend
            .draw(&Rectangle::new([(x, y), (x + SWATCH_PX, y + SWATCH_PX)], RGBColor(r, g, b).filled()))
            .map_err(render_err)?;
        legend
            .draw(&Rectangle::new([(x, y), (x + SWATCH_PX, y + SWATCH_PX)], BLACK.stroke_width(1)))
            .map_err(render_err)?;
        legend
            .draw(&Text::new(class.name(), (x + SWATCH_PX + 6, y), ("sans-serif", 14.0).into_font()))
            .map_err(render_err)?;
        x += SWATCH_PX + 16 + 9 * class.name().len() as i32;
    }

    root.present().map_err(render_err)?;
    tracing::debug!("Wrote preview of slice {} to '{}'", z, path.display());
    Ok(z)
}

/// Nearest-neighbour blit of a 2-D slice (indexed [x, y]) into `area`.
fn draw_slice<DB, F>(
    area:   &DrawingArea<DB, plotters::coord::Shift>,
    slice:  ArrayView2<'_, u8>,
    colour: F,
) -> Result<(), VisualizationError>
where
    DB: DrawingBackend,
    F: Fn(u8) -> [u8; 3],
{
    let (w, h) = area.dim_in_pixel();
    let (sx, sy) = (slice.shape()[0], slice.shape()[1]);
    if w == 0 || h == 0 || sx == 0 || sy == 0 {
        return Ok(());
    }

    // keep the slice's aspect ratio inside the panel
    let scale = (w as f64 / sx as f64).min(h as f64 / sy as f64);
    let (dw, dh) = ((sx as f64 * scale) as u32, (sy as f64 * scale) as u32);
    let (ox, oy) = ((w - dw) / 2, (h - dh) / 2);

    for py in 0..dh {
        let iy = ((py as f64 / scale) as usize).min(sy - 1);
        for px in 0..dw {
            let ix = ((px as f64 / scale) as usize).min(sx - 1);
            let [r, g, b] = colour(slice[[ix, iy]]);
            area.draw_pixel(((ox + px) as i32, (oy + py) as i32), &RGBColor(r, g, b))
                .map_err(render_err)?;
        }
    }
    Ok(())
}

fn render_err(cause: impl ToString) -> VisualizationError {
    VisualizationError::Render { artifact: ARTIFACT, cause: cause.to_string() }
}
