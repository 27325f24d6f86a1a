//! Training module
//!
//! Supervised fine-tuning of a [`crate::model::ResNet18`] on a
//! [`crate::dataset::LazyImageDataset`]:
//! 1. Batch the training manifest (optionally reshuffled every epoch)
//! 2. Forward pass, cross-entropy loss, backward pass, Adam step
//! 3. Optionally measure accuracy on a validation manifest after each epoch

pub mod config;
pub mod supervised;

// Re-export main types for convenience
pub use config::TrainingConfig;
pub use supervised::{evaluate, train, EpochRecord, TrainingSummary};

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 10;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// Default input side length
pub const DEFAULT_IMAGE_SIZE: u32 = 224;
