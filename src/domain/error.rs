// ============================================================
// Layer 3 — Error Kinds
// ============================================================
// Typed errors for every way a case can go wrong. Each stage
// of the pipeline returns its own kind; PipelineError gathers
// the job-fatal ones so the worker can record them on the job
// and carry on with the next case.
//
// The CLI wiring above this layer uses anyhow. These enums
// stay typed so tests can match on the exact failure.
//
// Reference: Rust Book §9 (Recoverable Errors with Result)

use std::{any::Any, path::PathBuf};
use thiserror::Error;

use crate::domain::job::JobStatus;
use crate::domain::modality::Modality;

// ─── LoadError ────────────────────────────────────────────────────────────────
/// A volume file could not be read or parsed.
#[derive(Debug, Error)]
#[error("cannot load volume '{}': {cause}", .path.display())]
pub struct LoadError {
    pub path:  PathBuf,
    pub cause: String,
}

impl LoadError {
    pub fn new(path: impl Into<PathBuf>, cause: impl ToString) -> Self {
        Self { path: path.into(), cause: cause.to_string() }
    }
}

// ─── ModelLoadError ───────────────────────────────────────────────────────────
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// No checkpoint in any of the candidate directories
    #[error("model checkpoint '{file}' not found in any location: {}", display_paths(.searched))]
    NotFound { file: String, searched: Vec<PathBuf> },

    /// The checkpoint exists but neither decode strategy accepted it
    #[error(
        "model loading failed for '{}': primary decode: {primary}; fallback decode: {fallback}",
        .path.display()
    )]
    Incompatible { path: PathBuf, primary: String, fallback: String },

    /// The compute device gave out while the weights were being placed on it
    #[error("compute device unavailable while loading the model: {0}")]
    Device(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ─── InferenceError ───────────────────────────────────────────────────────────
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference requested before the model was loaded")]
    ModelNotLoaded,

    #[error("backend failure during forward pass: {0}")]
    Backend(String),

    #[error("unexpected model output: {0}")]
    Output(String),
}

// ─── VisualizationError ───────────────────────────────────────────────────────
#[derive(Debug, Error)]
pub enum VisualizationError {
    #[error("cannot write '{}': {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render {artifact}: {cause}")]
    Render { artifact: &'static str, cause: String },

    #[error("volume has no slices along depth")]
    EmptyVolume,
}

// ─── TensorError ──────────────────────────────────────────────────────────────
/// The four volumes could not be stacked into one tensor.
#[derive(Debug, Error)]
pub enum TensorError {
    #[error("{modality} volume has shape {found:?}, expected {expected:?} (from T1)")]
    ShapeMismatch {
        modality: Modality,
        expected: [usize; 3],
        found:    [usize; 3],
    },

    #[error("expected {expected} volumes, got {found}")]
    VolumeCount { expected: usize, found: usize },
}

// ─── StoreError ───────────────────────────────────────────────────────────────
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("job store I/O on '{}': {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed job record '{}': {source}", .path.display())]
    Malformed {
        path:   PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid job id '{0}'")]
    InvalidId(String),

    #[error("job store lock poisoned")]
    Poisoned,
}

// ─── SubmissionError ──────────────────────────────────────────────────────────
/// A case was rejected before it reached the queue.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("expected exactly 4 modality files, got {0}")]
    WrongCount(usize),

    #[error("modality {0} given more than once")]
    DuplicateModality(Modality),

    #[error("job id must not be empty")]
    EmptyId,

    #[error("scheduler has shut down, job '{0}' was not queued")]
    QueueClosed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ─── JobStateError ────────────────────────────────────────────────────────────
#[derive(Debug, Error, PartialEq, Eq)]
#[error("job '{id}' cannot move from {from:?} to {to:?}")]
pub struct JobStateError {
    pub id:   String,
    pub from: JobStatus,
    pub to:   JobStatus,
}

// ─── PipelineError ────────────────────────────────────────────────────────────
/// Everything that can fail a job once the worker has picked it up.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Visualization(#[from] VisualizationError),

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    State(#[from] JobStateError),

    /// A stage panicked; the worker caught it at the job boundary
    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    /// Stable label for logs and diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Load(_)          => "load",
            PipelineError::ModelLoad(_)     => "model_load",
            PipelineError::Inference(_)     => "inference",
            PipelineError::Visualization(_) => "visualization",
            PipelineError::Tensor(_)        => "tensor",
            PipelineError::Store(_)         => "store",
            PipelineError::State(_)         => "state",
            PipelineError::Panicked(_)      => "panic",
        }
    }
}

/// Text of a caught panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
