// ============================================================
// Layer 4 — Channel Normalizer
// ============================================================
// Stacks the four modality volumes into one (4, X, Y, Z)
// tensor and rescales each channel on its own to [0, 1]:
//
//   x' = (x - min) / (max - min)
//
// Channels are normalized independently because the scanner
// intensity ranges differ wildly between sequences (a FLAIR
// may peak in the thousands while T1 sits near a hundred).
//
// A constant channel (max == min) has no range to stretch and
// becomes all zeros instead of dividing by zero.
//
// Reference: Rust Book §13 (Iterators)

use ndarray::{Array4, ArrayViewMut3, Axis};

use crate::domain::error::TensorError;
use crate::domain::modality::Modality;
use crate::domain::volume::{ImageVolume, ModalityTensor};

#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelNormalizer;

impl ChannelNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Stack volumes given in [T1, T1c, T2, FLAIR] order and
    /// normalize every channel.
    pub fn prepare(&self, volumes: &[ImageVolume]) -> Result<ModalityTensor, TensorError> {
        let tensor = stack(volumes)?;
        Ok(self.normalize(tensor))
    }

    /// Per-channel min-max rescale of an already stacked tensor.
    pub fn normalize(&self, mut tensor: ModalityTensor) -> ModalityTensor {
        for channel in tensor.channels_mut() {
            normalize_channel(channel);
        }
        tensor
    }
}

fn stack(volumes: &[ImageVolume]) -> Result<ModalityTensor, TensorError> {
    if volumes.len() != Modality::COUNT {
        return Err(TensorError::VolumeCount {
            expected: Modality::COUNT,
            found:    volumes.len(),
        });
    }

    let expected = shape_of(&volumes[0]);
    for (modality, volume) in Modality::ALL.iter().zip(volumes) {
        let found = shape_of(volume);
        if found != expected {
            return Err(TensorError::ShapeMismatch { modality: *modality, expected, found });
        }
    }

    let [x, y, z] = expected;
    let mut data = Array4::<f32>::zeros((Modality::COUNT, x, y, z));
    for (mut channel, volume) in data.axis_iter_mut(Axis(0)).zip(volumes) {
        channel.assign(volume);
    }

    ModalityTensor::from_array(data).ok_or(TensorError::VolumeCount {
        expected: Modality::COUNT,
        found:    volumes.len(),
    })
}

fn shape_of(volume: &ImageVolume) -> [usize; 3] {
    let s = volume.shape();
    [s[0], s[1], s[2]]
}

fn normalize_channel(mut channel: ArrayViewMut3<'_, f32>) {
    let (min, max) = channel
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let range = max - min;
    if !(range.is_finite() && range > 0.0) {
        channel.fill(0.0);
        return;
    }
    channel.mapv_inplace(|v| (v - min) / range);
}
