// ============================================================
// Layer 7 — Slice Sweep Animation
// ============================================================
// Builds animation.gif: a bidirectional sweep through the
// volume along the depth axis.
//
// One frame, for depth slice z:
//
//   ┌──────┬──────┬──────┬──────┬───────┐
//   │  T1  │ T1c  │  T2  │FLAIR │ label │   each X wide, Y tall
//   └──────┴──────┴──────┴──────┴───────┘
//
// Frame order for slices s0, s2, s4, ... (every 2nd slice):
//
//   s0 ×5, s2 ×5, ..., sN ×5, sN ×5, ..., s2 ×5, s0 ×5
//
// so the sweep plays forward then back and loops forever.
// Total frames: 2 * 5 * ceil(depth / 2).
//
// Only the unique frames are composed and palette-quantised;
// the schedule then writes them by index, so repeating a slice
// costs no extra memory.
//
// Reference: gif crate (Encoder, Frame, Repeat)
//            image crate (ImageBuffer)

use gif::{Encoder, Frame, Repeat};
use image::{Rgb, RgbImage};
use ndarray::{Array2, Axis};
use std::{fs::File, io::BufWriter, path::Path};

use crate::domain::error::VisualizationError;
use crate::domain::modality::Modality;
use crate::domain::volume::{LabelVolume, ModalityTensor, DEPTH_AXIS};
use crate::render::palette::{label_rgb, stretch_to_u8};

/// Take every n-th depth slice
pub const SLICE_STRIDE: usize = 2;
/// Times each slice is shown in a row
pub const FRAME_REPEAT: usize = 5;
/// Per-frame delay in hundredths of a second
pub const FRAME_DELAY_CS: u16 = 20;
/// NeuQuant speed passed to the gif quantiser (1 best .. 30 fastest)
const QUANTIZE_SPEED: i32 = 10;

const ARTIFACT: &str = "animation";

/// Depth indices shown in the sweep: 0, 2, 4, ...
pub fn sweep_slices(depth: usize) -> Vec<usize> {
    (0..depth).step_by(SLICE_STRIDE).collect()
}

/// Playback order as indices into the unique-frame list.
pub fn frame_schedule(unique: usize) -> Vec<usize> {
    let forward: Vec<usize> = (0..unique)
        .flat_map(|i| std::iter::repeat(i).take(FRAME_REPEAT))
        .collect();
    let mut schedule = forward.clone();
    schedule.extend(forward.into_iter().rev());
    schedule
}

/// Compose the five-panel RGB frame for depth slice `z`.
pub fn compose_frame(
    tensor: &ModalityTensor,
    labels: &LabelVolume,
    z:      usize,
) -> Result<RgbImage, VisualizationError> {
    let [x, y, depth] = labels.shape();
    if tensor.spatial_shape() != labels.shape() || z >= depth {
        return Err(VisualizationError::Render {
            artifact: ARTIFACT,
            cause:    format!(
                "slice {z} of tensor {:?} / labels {:?}",
                tensor.spatial_shape(),
                labels.shape()
            ),
        });
    }

    let grey: Vec<Array2<u8>> = (0..Modality::COUNT)
        .map(|c| stretch_to_u8(tensor.channel(c).index_axis_move(Axis(DEPTH_AXIS), z)))
        .collect();
    let label_slice = labels.labels().index_axis(Axis(DEPTH_AXIS), z);

    let panels = Modality::COUNT + 1;
    Ok(RgbImage::from_fn((x * panels) as u32, y as u32, |px, py| {
        let (panel, sx, sy) = (px as usize / x, px as usize % x, py as usize);
        match grey.get(panel) {
            Some(g) => {
                let v = g[[sx, sy]];
                Rgb([v, v, v])
            }
            None => Rgb(label_rgb(label_slice[[sx, sy]])),
        }
    }))
}

/// Render the full sweep to `path`. Returns the number of frames written.
pub fn write_animation(
    path:   &Path,
    tensor: &ModalityTensor,
    labels: &LabelVolume,
) -> Result<usize, VisualizationError> {
    let slices = sweep_slices(labels.depth());
    if slices.is_empty() {
        return Err(VisualizationError::EmptyVolume);
    }

    let frames = slices
        .iter()
        .map(|&z| compose_frame(tensor, labels, z))
        .collect::<Result<Vec<_>, _>>()?;
    let schedule = frame_schedule(frames.len());

    encode_gif(path, &frames, &schedule)?;
    tracing::debug!(
        "Wrote {} frames ({} unique) to '{}'",
        schedule.len(),
        frames.len(),
        path.display()
    );
    Ok(schedule.len())
}

/// Encode `frames` in `schedule` order as an infinitely looping GIF.
pub fn encode_gif(
    path:     &Path,
    frames:   &[RgbImage],
    schedule: &[usize],
) -> Result<(), VisualizationError> {
    let first = frames.first().ok_or(VisualizationError::EmptyVolume)?;
    let (w, h) = first.dimensions();
    let too_big = |_| render_err(format!("frame {w}x{h} exceeds the GIF size limit"));
    let w = u16::try_from(w).map_err(too_big)?;
    let h = u16::try_from(h).map_err(too_big)?;

    let encoded: Vec<Frame<'static>> = frames
        .iter()
        .map(|img| {
            let mut frame = Frame::from_rgb_speed(w, h, img.as_raw(), QUANTIZE_SPEED);
            frame.delay = FRAME_DELAY_CS;
            frame
        })
        .collect();

    let file = File::create(path)
        .map_err(|source| VisualizationError::Io { path: path.to_path_buf(), source })?;
    let mut encoder = Encoder::new(BufWriter::new(file), w, h, &[]).map_err(render_err)?;
    encoder.set_repeat(Repeat::Infinite).map_err(render_err)?;

    for &i in schedule {
        let frame = encoded
            .get(i)
            .ok_or_else(|| render_err(format!("schedule refers to missing frame {i}")))?;
        encoder.write_frame(frame).map_err(render_err)?;
    }
    Ok(())
}

fn render_err(cause: impl ToString) -> VisualizationError {
    VisualizationError::Render { artifact: ARTIFACT, cause: cause.to_string() }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn case(depth: usize) -> (ModalityTensor, LabelVolume) {
        let t = Array4::from_shape_fn((4, 6, 5, depth), |(c, x, y, z)| (c + x + y * z) as f32);
        let l = Array3::from_shape_fn((6, 5, depth), |(x, _, _)| (x % 4) as u8);
        (ModalityTensor::from_array(t).unwrap(), LabelVolume::new(l).unwrap())
    }

    fn count_gif_frames(path: &Path) -> usize {
        let mut decoder = gif::DecodeOptions::new().read_info(File::open(path).unwrap()).unwrap();
        let mut n = 0;
        while decoder.read_next_frame().unwrap().is_some() {
            n += 1;
        }
        n
    }

    #[test]
    fn test_schedule_is_forward_then_reverse() {
        let s = frame_schedule(3);
        assert_eq!(s.len(), 30);
        assert_eq!(&s[..6], &[0, 0, 0, 0, 0, 1]);
        assert_eq!(&s[14..16], &[2, 2]);
        assert_eq!(s[29], 0);
        let mut rev = s.clone();
        rev.reverse();
        assert_eq!(rev, s);
    }

    #[test]
    fn test_odd_depth_includes_last_even_slice() {
        assert_eq!(sweep_slices(7), vec![0, 2, 4, 6]);
        assert_eq!(sweep_slices(8), vec![0, 2, 4, 6]);
        assert_eq!(sweep_slices(1), vec![0]);
    }

    #[test]
    fn test_frame_layout() {
        let (t, l) = case(3);
        let img = compose_frame(&t, &l, 1).unwrap();
        assert_eq!(img.dimensions(), (30, 5));
        // label panel starts at x = 4 * 6; column 1 of the label slice is class 1
        assert_eq!(img.get_pixel(25, 0), &Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(24, 0), &Rgb([0, 0, 0]));
        // grey panels are replicated to RGB
        let p = img.get_pixel(7, 3);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn test_gif_frame_count_matches_depth() {
        let dir = tempfile::tempdir().unwrap();
        for depth in [1usize, 4, 5] {
            let (t, l) = case(depth);
            let path = dir.path().join(format!("sweep_{depth}.gif"));
            let written = write_animation(&path, &t, &l).unwrap();
            let expected = 2 * FRAME_REPEAT * depth.div_ceil(2);
            assert_eq!(written, expected);
            assert_eq!(count_gif_frames(&path), expected);
        }
    }

    #[test]
    fn test_mismatched_shapes_are_rejected() {
        let (t, _) = case(4);
        let l = LabelVolume::new(Array3::zeros((6, 5, 3))).unwrap();
        assert!(matches!(
            compose_frame(&t, &l, 0),
            Err(VisualizationError::Render { .. })
        ));
    }
}
