//! Model module
//!
//! ResNet-18 classifier used for fine-tuning, with Burn record loading for
//! pretrained weights and a replaceable final linear layer.

pub mod resnet;

// Re-export main types for convenience
pub use resnet::{ResNet18, ResNetConfig, FEATURE_DIM, IMAGENET_CLASSES};
