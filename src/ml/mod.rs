// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The network and the code that runs it. Together with the
// checkpoint loader in Layer 6, this is the only place that
// touches Burn tensors.
//
// What's in this layer:
//
//   model.rs      — The 3-D U-Net architecture
//                   • four conv blocks on the way down, 2× max-pool between
//                   • bottleneck block
//                   • four transposed-conv upsamples with skip concatenation
//                   • 1×1×1 classification head (4 classes)
//
//   inferencer.rs — The inference engine
//                   Lazily loads the checkpoint, pads the input to a
//                   multiple of 16, runs the forward pass, arg-maxes
//                   the class dimension and crops back.
//
// Reference: Burn Book §3 (Building Blocks)
//            Çiçek et al. (2016) 3D U-Net

/// 3-D U-Net architecture
pub mod model;

/// Inference engine — owns the model and segments tensors
pub mod inferencer;
