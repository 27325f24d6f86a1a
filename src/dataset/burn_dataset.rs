//! Lazy manifest-backed dataset and its Burn integration
//!
//! `LazyImageDataset` keeps only paths and labels in memory. Every `get`
//! decodes the image from disk again; there is no cache.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::{ImageReader, RgbImage};
use tracing::{debug, warn};

use crate::dataset::label_index::LabelIndex;
use crate::dataset::manifest::{read_manifest, ManifestFormat, Sample};
use crate::dataset::transform::{ImageTensor, ToTensor, Transform};
use crate::utils::error::{FinetuneError, IoResultExt, Result};

/// One decoded sample
#[derive(Clone, Debug, PartialEq)]
pub struct ImageItem {
    /// Transformed image, see [`ImageTensor`]
    pub image: ImageTensor,
    /// Dense class index
    pub label: usize,
    /// File the image was read from
    pub path: PathBuf,
}

/// Random-access dataset over the samples of one manifest
#[derive(Clone)]
pub struct LazyImageDataset {
    samples: Vec<Sample>,
    targets: Vec<usize>,
    labels: Arc<LabelIndex>,
    transform: Arc<dyn Transform>,
}

impl fmt::Debug for LazyImageDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyImageDataset")
            .field("len", &self.samples.len())
            .field("num_classes", &self.labels.len())
            .finish()
    }
}

impl LazyImageDataset {
    /// Load a tab-separated manifest; images are returned as raw `[0, 1]` tensors
    pub fn load(manifest: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(manifest, ManifestFormat::default(), Arc::new(ToTensor))
    }

    /// Load a manifest and build its label index from the labels it contains
    pub fn load_with(
        manifest: impl AsRef<Path>,
        format: ManifestFormat,
        transform: Arc<dyn Transform>,
    ) -> Result<Self> {
        let samples = read_manifest(manifest.as_ref(), format)?;
        let labels = LabelIndex::from_labels(samples.iter().map(|s| s.label.as_str()));
        Self::from_samples(samples, Arc::new(labels), transform)
    }

    /// Load a manifest against an existing label index, typically the one of
    /// the training set. Fails with [`FinetuneError::UnknownLabel`] if the
    /// manifest contains a label the index does not know.
    pub fn load_with_index(
        manifest: impl AsRef<Path>,
        format: ManifestFormat,
        transform: Arc<dyn Transform>,
        labels: Arc<LabelIndex>,
    ) -> Result<Self> {
        let samples = read_manifest(manifest.as_ref(), format)?;
        Self::from_samples(samples, labels, transform)
    }

    /// Build a dataset from samples already in memory
    pub fn from_samples(
        samples: Vec<Sample>,
        labels: Arc<LabelIndex>,
        transform: Arc<dyn Transform>,
    ) -> Result<Self> {
        let targets = samples
            .iter()
            .map(|sample| labels.index_of(&sample.label))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Dataset with {} samples over {} classes",
            samples.len(),
            labels.len()
        );
        Ok(Self {
            samples,
            targets,
            labels,
            transform,
        })
    }

    /// Number of samples
    pub fn size(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn label_index(&self) -> &LabelIndex {
        &self.labels
    }

    /// Shared handle to the label index, for datasets that must agree on it
    pub fn shared_label_index(&self) -> Arc<LabelIndex> {
        Arc::clone(&self.labels)
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Samples per class index
    pub fn class_distribution(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.labels.len()];
        for &target in &self.targets {
            counts[target] += 1;
        }
        counts
    }

    /// Decode, convert to RGB and transform sample `index`.
    ///
    /// The bounds check happens before any file is touched.
    pub fn get(&self, index: usize) -> Result<ImageItem> {
        let sample = self.samples.get(index).ok_or(FinetuneError::OutOfBounds {
            index,
            len: self.samples.len(),
        })?;

        let image = decode_rgb(&sample.path)?;
        Ok(ImageItem {
            image: self.transform.apply(image),
            label: self.targets[index],
            path: sample.path.clone(),
        })
    }
}

fn decode_rgb(path: &Path) -> Result<RgbImage> {
    let image = ImageReader::open(path)
        .with_path(path)?
        .with_guessed_format()
        .with_path(path)?
        .decode()
        .map_err(|source| FinetuneError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(image.to_rgb8())
}

impl Dataset<ImageItem> for LazyImageDataset {
    fn get(&self, index: usize) -> Option<ImageItem> {
        match LazyImageDataset::get(self, index) {
            Ok(item) => Some(item),
            Err(FinetuneError::OutOfBounds { .. }) => None,
            Err(e) => {
                warn!("Skipping sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of images with their targets
#[derive(Clone, Debug)]
pub struct ClassificationBatch<B: Backend> {
    /// Shape `[batch_size, channels, height, width]`
    pub images: Tensor<B, 4>,
    /// Shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks [`ImageItem`]s into a [`ClassificationBatch`] on a given device
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassificationBatcher;

impl ClassificationBatcher {
    pub fn new() -> Self {
        Self
    }

    /// Stack `items`, failing if the batch is empty or the images differ in shape
    pub fn try_batch<B: Backend>(
        &self,
        items: Vec<ImageItem>,
        device: &B::Device,
    ) -> Result<ClassificationBatch<B>> {
        let first = items
            .first()
            .ok_or_else(|| FinetuneError::Batch("cannot build a batch from zero items".to_string()))?;
        let shape = first.image.shape();

        if let Some(item) = items.iter().find(|item| item.image.shape() != shape) {
            return Err(FinetuneError::Batch(format!(
                "image {:?} has shape {:?}, expected {:?}",
                item.path,
                item.image.shape(),
                shape
            )));
        }

        Ok(stack(items, shape, device))
    }
}

impl<B: Backend> Batcher<B, ImageItem, ClassificationBatch<B>> for ClassificationBatcher {
    /// Items whose shape differs from the first item's are dropped
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ClassificationBatch<B> {
        let shape = items
            .first()
            .map(|item| item.image.shape())
            .unwrap_or([3, 0, 0]);

        let (kept, dropped): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|item| item.image.shape() == shape);
        for item in &dropped {
            warn!(
                "Dropping {:?} from batch: shape {:?} differs from {:?}",
                item.path,
                item.image.shape(),
                shape
            );
        }

        stack(kept, shape, device)
    }
}

fn stack<B: Backend>(
    items: Vec<ImageItem>,
    [channels, height, width]: [usize; 3],
    device: &B::Device,
) -> ClassificationBatch<B> {
    let batch_size = items.len();

    let mut images_data = Vec::with_capacity(batch_size * channels * height * width);
    let mut targets_data = Vec::with_capacity(batch_size);
    for item in items {
        images_data.extend(item.image.data);
        targets_data.push(item.label as i64);
    }

    let images = Tensor::<B, 4>::from_floats(
        TensorData::new(images_data, [batch_size, channels, height, width]),
        device,
    );
    let targets =
        Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

    ClassificationBatch { images, targets }
}
