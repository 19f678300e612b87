// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to take a case from
// four volume files to a finished job record.
//
//   pipeline.rs          — one job, stage by stage, with progress
//   scheduler.rs         — FIFO queue + the single worker thread
//   segment_use_case.rs  — wiring used by the CLI
//
// Rules for this layer:
//   - No tensor math or model code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

pub mod pipeline;
pub mod scheduler;
pub mod segment_use_case;

#[cfg(test)]
pub mod testing;
