//! Dataset module
//!
//! This module provides functionality for:
//! - Discovering labeled images in a `root/<label>/<file>` tree
//! - Stratified train/validation/test splitting persisted as manifests
//! - Lazy, per-index image loading from a manifest
//! - Batching for Burn training loops
//!
//! ## Split Strategy
//!
//! Validation and test sets have fixed absolute sizes (defaults 2000 and
//! 3000), the training set gets every remaining sample. Each class is
//! apportioned over the three sets in proportion to its share of the
//! dataset, so rare classes are never left out of evaluation.

pub mod burn_dataset;
pub mod label_index;
pub mod loader;
pub mod manifest;
pub mod split;
pub mod transform;

// Re-export main types for convenience
pub use burn_dataset::{ClassificationBatch, ClassificationBatcher, ImageItem, LazyImageDataset};
pub use label_index::LabelIndex;
pub use loader::{BatchLoader, Batches, LoaderConfig};
pub use manifest::{read_manifest, write_manifest, ManifestFormat, Sample};
pub use split::{DatasetSplits, DatasetSplitter, ManifestPaths, SplitConfig, SplitReport};
pub use transform::{ImageTensor, ImageTransform, Normalize, Resize, ToTensor, Transform};
