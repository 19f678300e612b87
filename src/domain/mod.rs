// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums, and traits describing one case
// as it moves through the segmentation pipeline.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O, rendering, or model code
//   - ndarray is allowed: volumes ARE arrays
//
// Everything the other layers exchange is defined here, so
// the scheduler can be tested with a fake segmenter and an
// in-memory job store without touching a GPU or the disk.

/// The four imaging modalities and their canonical order
pub mod modality;

/// Image volumes, stacked modality tensors and label volumes
pub mod volume;

/// Job descriptors, job records and the progress state machine
pub mod job;

/// Typed error kinds for every pipeline stage
pub mod error;

/// Seams implemented by the ml and infra layers
pub mod traits;
