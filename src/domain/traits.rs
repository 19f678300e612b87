// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The pipeline only talks to its collaborators through these
// traits:
//   - InferenceEngine implements Segmenter
//   - InMemoryJobStore and JsonJobStore implement JobStore
//   - RegionFractions implements MetricsProvider
//
// Tests swap in fakes (a segmenter that labels everything as
// edema, a store that records every write) without touching
// the scheduler.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Object Oriented Patterns)

use crate::domain::error::{InferenceError, ModelLoadError, StoreError};
use crate::domain::job::{JobRecord, Metrics};
use crate::domain::volume::{LabelVolume, ModalityTensor};

// ─── Segmenter ────────────────────────────────────────────────────────────────
/// Anything that turns a four-channel tensor into a label volume.
///
/// Calls are not re-entrant. The scheduler owns its segmenter
/// on a single worker thread, which serializes them.
pub trait Segmenter {
    /// Load the model if it has not been loaded yet.
    /// Once this succeeds, later calls return Ok immediately.
    fn ensure_loaded(&mut self) -> Result<(), ModelLoadError>;

    /// `(4, X, Y, Z)` → `(X, Y, Z)` with values in `[0, 3]`
    fn segment(&self, tensor: &ModalityTensor) -> Result<LabelVolume, InferenceError>;
}

// ─── JobStore ─────────────────────────────────────────────────────────────────
/// Narrow persistence interface for job records.
///
/// Shared between the submitting thread and the worker, so
/// implementations must be thread safe.
pub trait JobStore: Send + Sync {
    fn get(&self, id: &str) -> Result<JobRecord, StoreError>;

    /// Insert or replace the record with the same id
    fn save(&self, record: &JobRecord) -> Result<(), StoreError>;
}

// ─── MetricsProvider ──────────────────────────────────────────────────────────
/// Fills the `metrics` slot of a completed job.
pub trait MetricsProvider: Send {
    fn compute(&self, labels: &LabelVolume) -> Metrics;
}
