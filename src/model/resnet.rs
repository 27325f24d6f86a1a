//! ResNet-18 built with Burn modules
//!
//! Stem (7x7 conv, stride 2, 3x3 max pool), four stages of two basic
//! residual blocks (64, 128, 256, 512 channels), global average pooling and
//! a linear classifier. Fine-tuning swaps the classifier for a fresh one with
//! the number of classes of the target dataset.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, Tensor},
};
use tracing::info;

use crate::utils::error::FinetuneError;

/// Width of the last stage, input size of the classifier
pub const FEATURE_DIM: usize = 512;

/// Number of classes of ImageNet checkpoints
pub const IMAGENET_CLASSES: usize = 1000;

/// Configuration for [`ResNet18`]
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of output classes
    #[config(default = "1000")]
    pub num_classes: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,
}

/// 1x1 projection on the residual path when shape changes
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> Downsample<B> {
    fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3x3 convolutions with a residual connection
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);

        let downsample = if stride != 1 || in_channels != out_channels {
            Some(Downsample::new(in_channels, out_channels, stride, device))
        } else {
            None
        };

        Self {
            conv1,
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2,
            bn2: BatchNormConfig::new(out_channels).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));

        self.relu.forward(out + identity)
    }
}

/// A stage of residual blocks; only the first block may change stride or width
#[derive(Module, Debug)]
pub struct ResidualStage<B: Backend> {
    blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> ResidualStage<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        num_blocks: usize,
        device: &B::Device,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|i| {
                if i == 0 {
                    BasicBlock::new(in_channels, out_channels, stride, device)
                } else {
                    BasicBlock::new(out_channels, out_channels, 1, device)
                }
            })
            .collect();
        Self { blocks }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }
}

/// ResNet-18 classifier
#[derive(Module, Debug)]
pub struct ResNet18<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: ResidualStage<B>,
    layer2: ResidualStage<B>,
    layer3: ResidualStage<B>,
    layer4: ResidualStage<B>,
    avgpool: AdaptiveAvgPool2d,
    /// Final linear layer, replaced by [`ResNet18::with_num_classes`]
    pub fc: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ResNet18<B> {
    /// Randomly initialised network
    pub fn new(config: &ResNetConfig, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([config.in_channels, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            conv1,
            bn1: BatchNormConfig::new(64).init(device),
            relu: Relu::new(),
            maxpool,
            layer1: ResidualStage::new(64, 64, 1, 2, device),
            layer2: ResidualStage::new(64, 128, 2, 2, device),
            layer3: ResidualStage::new(128, 256, 2, 2, device),
            layer4: ResidualStage::new(256, FEATURE_DIM, 2, 2, device),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(FEATURE_DIM, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Network with weights read from a Burn record saved with [`CompactRecorder`].
    ///
    /// `config.num_classes` must match the classifier stored in the record.
    pub fn load_pretrained(
        config: &ResNetConfig,
        path: impl AsRef<Path>,
        device: &B::Device,
    ) -> crate::utils::error::Result<Self> {
        let path = path.as_ref();
        let model = Self::new(config, device)
            .load_file(path, &CompactRecorder::new(), device)
            .map_err(|e| {
                FinetuneError::Model(format!("failed to load weights from {:?}: {:?}", path, e))
            })?;

        info!("Loaded pretrained weights from {:?}", path);
        Ok(model)
    }

    /// Save the weights with [`CompactRecorder`]
    pub fn save(self, path: impl AsRef<Path>) -> crate::utils::error::Result<()> {
        let path = path.as_ref();
        self.save_file(path, &CompactRecorder::new())
            .map_err(|e| FinetuneError::Model(format!("failed to save weights to {:?}: {:?}", path, e)))
    }

    /// Replace the classifier with a freshly initialised `512 -> num_classes` layer
    pub fn with_num_classes(mut self, num_classes: usize, device: &B::Device) -> Self {
        self.fc = LinearConfig::new(FEATURE_DIM, num_classes).init(device);
        self.num_classes = num_classes;
        self
    }

    /// Logits of shape `[batch_size, num_classes]` for `[batch_size, 3, H, W]` input
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.relu.forward(self.bn1.forward(x));
        let x = self.maxpool.forward(x);

        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        let x = self.layer4.forward(x);

        // [B, 512, H, W] -> [B, 512]
        let x = self.avgpool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
