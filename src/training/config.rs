//! Training hyperparameters

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::loader::LoaderConfig;
use crate::dataset::manifest::ManifestFormat;
use crate::dataset::transform::{ImageTransform, Normalize, Resize};
use crate::model::IMAGENET_CLASSES;
use crate::utils::error::{FinetuneError, IoResultExt, Result};

use super::{DEFAULT_BATCH_SIZE, DEFAULT_EPOCHS, DEFAULT_IMAGE_SIZE, DEFAULT_LEARNING_RATE};

/// Configuration for a fine-tuning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the training set
    pub epochs: usize,

    /// Samples per batch
    pub batch_size: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Side of the square images fed to the network
    pub image_size: u32,

    /// Apply ImageNet mean/std normalization
    pub normalize: bool,

    /// Reshuffle the training set every epoch
    pub shuffle: bool,

    /// Threads decoding images
    pub num_workers: usize,

    /// Seed for the shuffling order
    pub seed: u64,

    /// Line format of the manifests
    pub format: ManifestFormat,

    /// Burn record with pretrained weights; random init when absent
    pub pretrained: Option<PathBuf>,

    /// Classifier width of the pretrained record
    pub pretrained_num_classes: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            image_size: DEFAULT_IMAGE_SIZE,
            normalize: true,
            shuffle: false,
            num_workers: 1,
            seed: 42,
            format: ManifestFormat::default(),
            pretrained: None,
            pretrained_num_classes: IMAGENET_CLASSES,
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(FinetuneError::Config("epochs must be > 0".to_string()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(FinetuneError::Config(
                "learning_rate must be a positive number".to_string(),
            ));
        }
        if self.image_size == 0 {
            return Err(FinetuneError::Config("image_size must be > 0".to_string()));
        }
        if self.pretrained_num_classes == 0 {
            return Err(FinetuneError::Config(
                "pretrained_num_classes must be > 0".to_string(),
            ));
        }
        self.loader_config(self.shuffle).validate()
    }

    /// Loader options for this run
    pub fn loader_config(&self, shuffle: bool) -> LoaderConfig {
        LoaderConfig {
            batch_size: self.batch_size,
            shuffle,
            num_workers: self.num_workers,
            seed: self.seed,
        }
    }

    /// Resize to `image_size`, then optionally normalize
    pub fn transform(&self) -> ImageTransform {
        let transform = ImageTransform::new().with_resize(Resize::square(self.image_size));
        if self.normalize {
            transform.with_normalize(Normalize::imagenet())
        } else {
            transform
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FinetuneError::Serialization(e.to_string()))?;
        std::fs::write(path, json).with_path(path)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_path(path)?;
        serde_json::from_str(&json).map_err(|e| FinetuneError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.learning_rate, 0.001);
        assert_eq!(config.image_size, 224);
        assert_eq!(config.num_workers, 1);
        assert!(!config.shuffle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let config = TrainingConfig {
            epochs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrainingConfig {
            learning_rate: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TrainingConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transform_follows_normalize_flag() {
        let config = TrainingConfig {
            image_size: 64,
            normalize: false,
            ..Default::default()
        };
        assert_eq!(config.transform().resize, Some(Resize::square(64)));
        assert!(config.transform().normalize.is_none());
        assert!(TrainingConfig::default().transform().normalize.is_some());
    }

    #[test]
    fn test_save_load_partial_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{"epochs": 3, "format": "jsonl"}"#).unwrap();

        let config = TrainingConfig::load(&path).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.format, ManifestFormat::JsonLines);
        assert_eq!(config.batch_size, 32);

        config.save(&path).unwrap();
        assert_eq!(TrainingConfig::load(&path).unwrap(), config);
    }
}
