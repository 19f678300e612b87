// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer turns four files on disk into one model-ready
// tensor.
//
// The pipeline flows in this order:
//
//   t1 / t1c / t2 / flair (.nii, .nii.gz)
//       │
//       ▼
//   nifti              → decodes header + voxels into [x, y, z]
//       │
//       ▼
//   VolumeLoader       → sanitizes NaN / ±Inf, maps failures to LoadError
//       │
//       ▼
//   ChannelNormalizer  → stacks (4, X, Y, Z), min-max per channel
//       │
//       ▼
//   ModalityTensor     → handed to the InferenceEngine (Layer 5)
//
// Each module is responsible for exactly one step.
//
// Reference: Rust Book §13 (Iterators and Closures)

/// NIfTI-1 header and voxel decoding
pub mod nifti;

/// Reads and sanitizes a single modality volume
pub mod loader;

/// Stacks modalities and rescales each channel to [0, 1]
pub mod normalizer;
