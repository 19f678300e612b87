// ============================================================
// Layer 5 — 3-D U-Net
// ============================================================
// Volumetric encoder/decoder with skip connections.
//
//   input (N, 4, D, H, W)
//     enc1 ─────────────────────────────────────────┐ w
//     pool → enc2 ─────────────────────────────┐ 2w │
//            pool → enc3 ─────────────────┐ 4w │    │
//                   pool → enc4 ─────┐ 8w │    │    │
//                          pool → bottleneck 16w    │
//                   upconv4 + cat ◄──┘    │    │    │
//                   dec4            ◄─────┘    │    │
//            upconv3 + cat, dec3  ◄────────────┘    │
//     upconv2 + cat, dec2, upconv1 + cat, dec1 ◄────┘
//     head (1×1×1 conv) → (N, classes, D, H, W)
//
// Every spatial dimension must be divisible by 16 (four 2×
// poolings). The inference engine pads to guarantee that.
//
// Field names mirror the trained checkpoint's parameter keys
// (enc1..enc4, bottleneck, upconv4..upconv1, dec4..dec1).
// `final` is a Rust keyword, so the output conv is `head`
// and the checkpoint loader renames it.
//
// Reference: Ronneberger et al. (U-Net), Çiçek et al. (3D U-Net)
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv3d, Conv3dConfig, ConvTranspose3d, ConvTranspose3dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Spatial dims must be a multiple of this (2^4 poolings)
pub const SPATIAL_MULTIPLE: usize = 16;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct UNet3dConfig {
    #[config(default = 4)]
    pub in_channels: usize,
    #[config(default = 4)]
    pub num_classes: usize,
    /// Channels of the first encoder block; doubles at each level
    #[config(default = 32)]
    pub base_width:  usize,
}

impl UNet3dConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet3d<B> {
        let w = self.base_width;
        UNet3d {
            enc1:       conv_block(self.in_channels, w, device),
            enc2:       conv_block(w, 2 * w, device),
            enc3:       conv_block(2 * w, 4 * w, device),
            enc4:       conv_block(4 * w, 8 * w, device),
            bottleneck: conv_block(8 * w, 16 * w, device),
            upconv4:    up_conv(16 * w, 8 * w, device),
            dec4:       conv_block(16 * w, 8 * w, device),
            upconv3:    up_conv(8 * w, 4 * w, device),
            dec3:       conv_block(8 * w, 4 * w, device),
            upconv2:    up_conv(4 * w, 2 * w, device),
            dec2:       conv_block(4 * w, 2 * w, device),
            upconv1:    up_conv(2 * w, w, device),
            dec1:       conv_block(2 * w, w, device),
            head:       Conv3dConfig::new([w, self.num_classes], [1, 1, 1]).init(device),
        }
    }
}

fn conv_block<B: Backend>(c_in: usize, c_out: usize, device: &B::Device) -> ConvBlock<B> {
    let conv = |i, o| {
        Conv3dConfig::new([i, o], [3, 3, 3])
            .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
            .init(device)
    };
    ConvBlock {
        conv1: conv(c_in, c_out),
        norm1: BatchNormConfig::new(c_out).init(device),
        conv2: conv(c_out, c_out),
        norm2: BatchNormConfig::new(c_out).init(device),
    }
}

fn up_conv<B: Backend>(c_in: usize, c_out: usize, device: &B::Device) -> ConvTranspose3d<B> {
    ConvTranspose3dConfig::new([c_in, c_out], [2, 2, 2])
        .with_stride([2, 2, 2])
        .init(device)
}

// ─── ConvBlock ────────────────────────────────────────────────────────────────
/// conv3³ → BN → ReLU → conv3³ → BN → ReLU
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv3d<B>,
    pub norm1: BatchNorm<B>,
    pub conv2: Conv3d<B>,
    pub norm2: BatchNorm<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = relu(self.norm1.forward(self.conv1.forward(x)));
        relu(self.norm2.forward(self.conv2.forward(x)))
    }
}

// ─── UNet3d ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct UNet3d<B: Backend> {
    pub enc1:       ConvBlock<B>,
    pub enc2:       ConvBlock<B>,
    pub enc3:       ConvBlock<B>,
    pub enc4:       ConvBlock<B>,
    pub bottleneck: ConvBlock<B>,
    pub upconv4:    ConvTranspose3d<B>,
    pub dec4:       ConvBlock<B>,
    pub upconv3:    ConvTranspose3d<B>,
    pub dec3:       ConvBlock<B>,
    pub upconv2:    ConvTranspose3d<B>,
    pub dec2:       ConvBlock<B>,
    pub upconv1:    ConvTranspose3d<B>,
    pub dec1:       ConvBlock<B>,
    pub head:       Conv3d<B>,
}

impl<B: Backend> UNet3d<B> {
    /// (N, C_in, D, H, W) → class logits (N, classes, D, H, W)
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let e1 = self.enc1.forward(x);
        let e2 = self.enc2.forward(max_pool2(e1.clone()));
        let e3 = self.enc3.forward(max_pool2(e2.clone()));
        let e4 = self.enc4.forward(max_pool2(e3.clone()));

        let b = self.bottleneck.forward(max_pool2(e4.clone()));

        let d4 = self.dec4.forward(Tensor::cat(vec![self.upconv4.forward(b), e4], 1));
        let d3 = self.dec3.forward(Tensor::cat(vec![self.upconv3.forward(d4), e3], 1));
        let d2 = self.dec2.forward(Tensor::cat(vec![self.upconv2.forward(d3), e2], 1));
        let d1 = self.dec1.forward(Tensor::cat(vec![self.upconv1.forward(d2), e1], 1));

        self.head.forward(d1)
    }
}

/// 2×2×2 max-pooling with stride 2.
///
/// Each spatial axis is split into (n/2, 2) and the max is taken
/// over the three window axes. Batch, channel and the outer depth
/// axis are folded together so the view stays within the 6 dims
/// the ndarray backend supports. Input dims must be even.
pub fn max_pool2<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 5> {
    let [n, c, d, h, w] = x.dims();
    let (d2, h2, w2) = (d / 2, h / 2, w / 2);
    x.reshape([n * c * d2, 2, h2, 2, w2, 2])
        .max_dim(5)
        .max_dim(3)
        .max_dim(1)
        .reshape([n, c, d2, h2, w2])
}
