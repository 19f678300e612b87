// Test doubles shared by the application-layer tests.

use ndarray::Array3;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
    thread,
    time::Duration,
};

use crate::data::nifti::testing::write_volume;
use crate::domain::error::{InferenceError, ModelLoadError, StoreError};
use crate::domain::job::{JobDescriptor, JobRecord, JobStatus};
use crate::domain::modality::Modality;
use crate::domain::traits::{JobStore, Segmenter};
use crate::domain::volume::{LabelVolume, ModalityTensor};
use crate::infra::config::PipelineConfig;

// ─── FakeSegmenter ────────────────────────────────────────────────────────────
/// Labels every voxel with one class, optionally after a delay.
pub struct FakeSegmenter {
    label:    u8,
    loadable: bool,
    delay:    Duration,
}

impl FakeSegmenter {
    pub fn labelling(label: u8) -> Self {
        Self { label, loadable: true, delay: Duration::ZERO }
    }

    pub fn unloadable() -> Self {
        Self { loadable: false, ..Self::labelling(0) }
    }

    pub fn slow(label: u8, delay: Duration) -> Self {
        Self { delay, ..Self::labelling(label) }
    }
}

impl Segmenter for FakeSegmenter {
    fn ensure_loaded(&mut self) -> Result<(), ModelLoadError> {
        if !self.loadable {
            return Err(ModelLoadError::NotFound {
                file:     "best_model.pth".into(),
                searched: vec![PathBuf::from("/models")],
            });
        }
        Ok(())
    }

    fn segment(&self, tensor: &ModalityTensor) -> Result<LabelVolume, InferenceError> {
        thread::sleep(self.delay);
        let [x, y, z] = tensor.spatial_shape();
        LabelVolume::new(Array3::from_elem((x, y, z), self.label))
            .ok_or_else(|| InferenceError::Output("bad fake label".into()))
    }
}

// ─── RecordingStore ───────────────────────────────────────────────────────────
/// In-memory store that keeps every saved version and tracks
/// how many jobs were `processing` at the same time.
#[derive(Default)]
pub struct RecordingStore {
    inner: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    current:        HashMap<String, JobRecord>,
    history:        Vec<JobRecord>,
    max_processing: usize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every saved version of `id`, oldest first
    pub fn history(&self, id: &str) -> Vec<JobRecord> {
        let state = self.inner.lock().unwrap();
        state.history.iter().filter(|r| r.id == id).cloned().collect()
    }

    pub fn max_processing(&self) -> usize {
        self.inner.lock().unwrap().max_processing
    }
}

impl JobStore for RecordingStore {
    fn get(&self, id: &str) -> Result<JobRecord, StoreError> {
        let state = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        state.current.get(id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn save(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut state = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        state.current.insert(record.id.clone(), record.clone());
        state.history.push(record.clone());
        let processing = state
            .current
            .values()
            .filter(|r| r.status == JobStatus::Processing)
            .count();
        state.max_processing = state.max_processing.max(processing);
        Ok(())
    }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────
/// Write four small volumes named `<id>_<modality>.nii.gz` and
/// return a descriptor for them.
pub fn write_case(dir: &Path, id: &str, shape: (usize, usize, usize)) -> JobDescriptor {
    let files = Modality::ALL
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let path = dir.join(format!("{id}_{}.nii.gz", m.label().to_lowercase()));
            let vol  = Array3::from_shape_fn(shape, |(x, y, z)| ((x + y + z) * (i + 1)) as f32);
            write_volume(&path, &vol, true);
            (*m, path)
        })
        .collect();
    JobDescriptor::new(id, files).unwrap()
}

/// Config writing artifacts under `<root>/out` with small previews
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        model_dir:        root.join("models"),
        output_root:      root.join("out"),
        store_dir:        root.join("jobs"),
        preview_panel_px: 32,
        ..PipelineConfig::default()
    }
}
