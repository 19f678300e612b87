// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   checkpoint.rs — Finding and decoding model weights
//                   PyTorch .pth (three layouts) first, then
//                   Burn's CompactRecorder record as fallback.
//
//   job_store.rs  — JobStore implementations
//                   In-memory (tests, single process) and a
//                   directory of <id>.json files.
//
//   metrics.rs    — The shipped MetricsProvider
//                   Per-region voxel fractions of a prediction.
//
//   config.rs     — PipelineConfig
//                   Paths and knobs, loaded from / saved to JSON.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint location and decoding
pub mod checkpoint;

/// Job record persistence
pub mod job_store;

/// Region volume fractions for the results payload
pub mod metrics;

/// Pipeline configuration
pub mod config;
