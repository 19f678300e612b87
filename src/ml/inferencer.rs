// ============================================================
// Layer 5 — Inference Engine
// ============================================================
// Owns the U-Net for the lifetime of the worker:
//
//   ensure_loaded()  locate + decode the checkpoint once, then
//                    keep the model pinned to the device
//   segment()        (4, X, Y, Z) → (X, Y, Z) class indices
//
// The network halves every spatial dim four times, so inputs
// are zero-padded up to a multiple of 16 and the prediction is
// cropped back to the original extent.
//
// The engine is not re-entrant. The scheduler's single worker
// thread owns it and is the only caller.

use burn::{prelude::*, tensor::TensorData};
use ndarray::{s, Array3, Array4};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crate::domain::error::{panic_message, InferenceError, ModelLoadError};
use crate::domain::traits::Segmenter;
use crate::domain::volume::{LabelVolume, ModalityTensor};
use crate::infra::checkpoint;
use crate::ml::model::{UNet3d, UNet3dConfig, SPATIAL_MULTIPLE};

/// GPU when built with the `wgpu` feature, CPU otherwise
#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;
#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

pub struct InferenceEngine<B: Backend = InferBackend> {
    model_dir: PathBuf,
    config:    UNet3dConfig,
    device:    B::Device,
    model:     Option<UNet3d<B>>,
}

impl<B: Backend> InferenceEngine<B> {
    /// Nothing is read from disk until the first `ensure_loaded`.
    pub fn new(model_dir: impl Into<PathBuf>, config: UNet3dConfig) -> Self {
        Self {
            model_dir: model_dir.into(),
            config,
            device: B::Device::default(),
            model: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }
}

impl<B: Backend> Segmenter for InferenceEngine<B> {
    fn ensure_loaded(&mut self) -> Result<(), ModelLoadError> {
        if self.model.is_some() {
            return Ok(());
        }

        let path = checkpoint::locate(&self.model_dir)?;
        tracing::info!("Loading model from '{}'", path.display());

        // device setup (e.g. no usable GPU adapter) reports failure by panicking
        let (model, from) = on_device(|| {
            let (model, from) = checkpoint::load_unet::<B>(&path, &self.config, &self.device)?;
            // Inference backends carry no autodiff; BatchNorm then uses running stats
            Ok((model.no_grad().to_device(&self.device), from))
        })?;
        tracing::info!("Model ready ({:?}) on {:?}", from, self.device);

        self.model = Some(model);
        Ok(())
    }

    fn segment(&self, tensor: &ModalityTensor) -> Result<LabelVolume, InferenceError> {
        let model = self.model.as_ref().ok_or(InferenceError::ModelNotLoaded)?;

        let [x, y, z] = tensor.spatial_shape();
        let padded    = pad_to_multiple(tensor.data(), SPATIAL_MULTIPLE);
        let [c, px, py, pz] = [
            padded.shape()[0],
            padded.shape()[1],
            padded.shape()[2],
            padded.shape()[3],
        ];
        tracing::debug!("Forward pass on {}x{}x{} (padded from {}x{}x{})", px, py, pz, x, y, z);

        let values: Vec<f32> = padded.iter().copied().collect();

        // Backend kernels report some failures (OOM, bad shapes) by panicking
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let input  = Tensor::<B, 5>::from_data(TensorData::new(values, [1, c, px, py, pz]), &self.device);
            let logits = model.forward(input);
            logits.argmax(1).into_data().convert::<i64>().to_vec::<i64>()
        }));

        let classes = match outcome {
            Ok(Ok(classes)) => classes,
            Ok(Err(e))      => return Err(InferenceError::Output(format!("{e:?}"))),
            Err(payload)    => return Err(InferenceError::Backend(panic_message(payload))),
        };

        let labels: Vec<u8> = classes.into_iter().map(|v| v.clamp(0, u8::MAX as i64) as u8).collect();
        let full = Array3::from_shape_vec((px, py, pz), labels)
            .map_err(|e| InferenceError::Output(e.to_string()))?;
        let cropped = full.slice(s![..x, ..y, ..z]).to_owned();

        LabelVolume::new(cropped)
            .ok_or_else(|| InferenceError::Output("class index outside [0, 3]".to_string()))
    }
}

/// Run model setup, turning a backend panic into ModelLoadError::Device.
fn on_device<T>(setup: impl FnOnce() -> Result<T, ModelLoadError>) -> Result<T, ModelLoadError> {
    panic::catch_unwind(AssertUnwindSafe(setup))
        .unwrap_or_else(|payload| Err(ModelLoadError::Device(panic_message(payload))))
}

/// Zero-pad every spatial axis up to the next multiple of `m`.
pub fn pad_to_multiple(data: &Array4<f32>, m: usize) -> Array4<f32> {
    let shape = data.shape();
    let up = |n: usize| n.div_ceil(m).max(1) * m;
    let (c, x, y, z) = (shape[0], shape[1], shape[2], shape[3]);

    let mut out = Array4::<f32>::zeros((c, up(x), up(y), up(z)));
    out.slice_mut(s![.., ..x, ..y, ..z]).assign(data);
    out
}
