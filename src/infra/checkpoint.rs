// ============================================================
// Layer 6 — Checkpoint Loader
// ============================================================
// Finds the trained U-Net weights on disk and loads them into
// a freshly initialised UNet3d.
//
// Where we look (first match wins):
//   <model_dir>/best_model.pth
//   <model_dir>/../best_model.pth
//
// How we decode, in order:
//
//   1. PyTorch checkpoint (primary). Training scripts save the
//      weights in one of three layouts, tried in this order:
//        { "model_state_dict": {...}, "epoch": ..., ... }
//        { "state_dict": {...} }
//        {...}                          (raw parameter map)
//
//   2. Burn native record (fallback): best_model.mpk next to
//      the .pth, written with CompactRecorder.
//
// If every layout and the fallback fail, the error keeps all
// causes so the job's error message says what went wrong.
//
// PyTorch key layout vs ours:
//   enc1.0.weight            → enc1.conv1.weight
//   enc1.1.running_mean      → enc1.norm1.running_mean
//   enc1.3.weight            → enc1.conv2.weight
//   enc1.4.bias              → enc1.norm2.beta
//   final.weight             → head.weight
// Index 2 and 5 are ReLUs and carry no parameters.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            burn-store PytorchStore

use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use burn_store::{ModuleSnapshot, PytorchStore};
use std::path::{Path, PathBuf};

use crate::domain::error::ModelLoadError;
use crate::ml::model::{UNet3d, UNet3dConfig};

/// Name of the trained checkpoint we look for
pub const CHECKPOINT_FILE: &str = "best_model.pth";

/// Sequential index → field name inside a conv block
const BLOCK_REMAPS: [(&str, &str); 5] = [
    (r"^([a-z]+\d?)\.0\.", "${1}.conv1."),
    (r"^([a-z]+\d?)\.1\.", "${1}.norm1."),
    (r"^([a-z]+\d?)\.3\.", "${1}.conv2."),
    (r"^([a-z]+\d?)\.4\.", "${1}.norm2."),
    (r"^final\.",          "head."),
];

// ─── PytorchLayout ────────────────────────────────────────────────────────────
/// The ways a PyTorch checkpoint may wrap its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PytorchLayout {
    ModelStateDict,
    StateDict,
    Raw,
}

impl PytorchLayout {
    /// Priority order for decoding
    pub const ORDER: [PytorchLayout; 3] = [
        PytorchLayout::ModelStateDict,
        PytorchLayout::StateDict,
        PytorchLayout::Raw,
    ];

    fn top_level_key(self) -> Option<&'static str> {
        match self {
            PytorchLayout::ModelStateDict => Some("model_state_dict"),
            PytorchLayout::StateDict      => Some("state_dict"),
            PytorchLayout::Raw            => None,
        }
    }

    fn store(self, path: &Path) -> PytorchStore {
        let mut store = PytorchStore::from_file(path).map_indices_contiguous(false);
        if let Some(key) = self.top_level_key() {
            store = store.with_top_level_key(key);
        }
        for (from, to) in BLOCK_REMAPS {
            store = store.with_key_remapping(from, to);
        }
        store
    }
}

/// Which strategy produced the loaded weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadedFrom {
    Pytorch(PytorchLayout),
    NativeRecord,
}

// ─── Locating ─────────────────────────────────────────────────────────────────
/// Candidate checkpoint paths, in search order.
pub fn candidate_paths(model_dir: &Path) -> Vec<PathBuf> {
    let mut paths = vec![model_dir.join(CHECKPOINT_FILE)];
    if let Some(parent) = model_dir.parent() {
        paths.push(parent.join(CHECKPOINT_FILE));
    }
    paths
}

/// Resolve the checkpoint path or report every place we looked.
pub fn locate(model_dir: &Path) -> Result<PathBuf, ModelLoadError> {
    let candidates = candidate_paths(model_dir);
    for path in &candidates {
        tracing::debug!("Looking for checkpoint at '{}'", path.display());
        if path.is_file() {
            return Ok(path.clone());
        }
    }
    Err(ModelLoadError::NotFound {
        file:     CHECKPOINT_FILE.to_string(),
        searched: candidates,
    })
}

/// The native-record sibling of a .pth checkpoint (`best_model.mpk`)
pub fn native_record_path(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension("mpk")
}

// ─── Loading ──────────────────────────────────────────────────────────────────
/// Build a U-Net and fill it with the weights at `checkpoint`.
pub fn load_unet<B: Backend>(
    checkpoint: &Path,
    config:     &UNet3dConfig,
    device:     &B::Device,
) -> Result<(UNet3d<B>, LoadedFrom), ModelLoadError> {
    // ── Step 1: PyTorch layouts, in priority order ───────────────────────────
    let mut primary = Vec::new();
    for layout in PytorchLayout::ORDER {
        // a fresh model per attempt so a partial apply never leaks through
        let mut model: UNet3d<B> = config.init(device);
        let mut store = layout.store(checkpoint);
        match model.load_from(&mut store) {
            Ok(result) => {
                tracing::info!(
                    "Loaded {} tensors from '{}' ({:?} layout, {} unused)",
                    result.applied.len(),
                    checkpoint.display(),
                    layout,
                    result.unused.len(),
                );
                return Ok((model, LoadedFrom::Pytorch(layout)));
            }
            Err(e) => {
                tracing::debug!("{:?} layout rejected: {}", layout, e);
                primary.push(format!("{layout:?}: {e}"));
            }
        }
    }

    // ── Step 2: Burn native record ───────────────────────────────────────────
    let native = native_record_path(checkpoint);
    tracing::warn!(
        "PyTorch decode failed for '{}', trying native record '{}'",
        checkpoint.display(),
        native.display()
    );
    let model: UNet3d<B> = config.init(device);
    match CompactRecorder::new().load(native.clone(), device) {
        Ok(record) => {
            tracing::info!("Loaded native record '{}'", native.display());
            Ok((model.load_record(record), LoadedFrom::NativeRecord))
        }
        Err(e) => Err(ModelLoadError::Incompatible {
            path:     checkpoint.to_path_buf(),
            primary:  primary.join(" | "),
            fallback: format!("'{}': {}", native.display(), e),
        }),
    }
}

/// Write `model` as a native record next to `checkpoint`.
#[cfg(test)]
pub fn save_native_record<B: Backend>(model: &UNet3d<B>, checkpoint: &Path) {
    CompactRecorder::new()
        .record(model.clone().into_record(), native_record_path(checkpoint))
        .unwrap();
}
