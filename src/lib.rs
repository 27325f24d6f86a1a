//! # folder_finetune
//!
//! Fine-tune an image classifier on a folder of labeled images with the Burn
//! framework.
//!
//! ## Modules
//!
//! - `dataset`: discovery of `root/<label>/<file>` trees, stratified
//!   train/validation/test splits, manifests, and the lazy image dataset
//! - `model`: ResNet-18 with a replaceable classifier
//! - `training`: supervised fine-tuning loop and evaluation
//! - `utils`: error type, logging, and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use folder_finetune::{DatasetSplitter, LazyImageDataset, SplitConfig};
//!
//! // Write train_set.txt, validation_set.txt and test_set.txt
//! let report = DatasetSplitter::new(SplitConfig::default()).run("data/images", "data")?;
//! println!("{}", report);
//!
//! // Decode images only when they are requested
//! let dataset = LazyImageDataset::load("data/train_set.txt")?;
//! let item = dataset.get(0)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    BatchLoader, ClassificationBatch, ClassificationBatcher, DatasetSplits, DatasetSplitter,
    ImageItem, ImageTransform, LabelIndex, LazyImageDataset, ManifestFormat, Sample, SplitConfig,
    SplitReport, Transform,
};
pub use model::{ResNet18, ResNetConfig};
pub use training::{evaluate, train, TrainingConfig, TrainingSummary};
pub use utils::error::{FinetuneError, Result};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
