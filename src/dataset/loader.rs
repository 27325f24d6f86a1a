//! Batching iterator over a [`LazyImageDataset`]
//!
//! Each epoch visits every index once, optionally in a seeded shuffled order.
//! The items of a batch are decoded on a dedicated rayon pool.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::dataset::burn_dataset::{ImageItem, LazyImageDataset};
use crate::utils::error::{FinetuneError, Result};

/// Batching options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Reshuffle the visiting order at the start of every epoch
    pub shuffle: bool,
    /// Threads decoding images in parallel
    pub num_workers: usize,
    pub seed: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: false,
            num_workers: 1,
            seed: 42,
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FinetuneError::Config("batch_size must be > 0".to_string()));
        }
        if self.num_workers == 0 {
            return Err(FinetuneError::Config("num_workers must be > 0".to_string()));
        }
        Ok(())
    }
}

pub struct BatchLoader<'a> {
    dataset: &'a LazyImageDataset,
    config: LoaderConfig,
    rng: ChaCha8Rng,
    pool: ThreadPool,
}

impl<'a> BatchLoader<'a> {
    pub fn new(dataset: &'a LazyImageDataset, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.num_workers)
            .thread_name(|i| format!("loader-{}", i))
            .build()
            .map_err(|e| FinetuneError::Config(format!("failed to start loader workers: {}", e)))?;

        Ok(Self {
            dataset,
            config,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            pool,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Batches per epoch, counting a final partial batch
    pub fn num_batches(&self) -> usize {
        self.dataset.size().div_ceil(self.config.batch_size)
    }

    /// Iterator over the batches of one epoch
    pub fn epoch(&mut self) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.dataset.size()).collect();
        if self.config.shuffle {
            order.shuffle(&mut self.rng);
        }

        Batches {
            dataset: self.dataset,
            pool: &self.pool,
            order,
            batch_size: self.config.batch_size,
            position: 0,
        }
    }
}

/// Batches of one epoch. A batch fails as a whole if any of its items fails.
pub struct Batches<'l> {
    dataset: &'l LazyImageDataset,
    pool: &'l ThreadPool,
    order: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<Vec<ImageItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.order.len() {
            return None;
        }
        let start = self.position;
        let end = (start + self.batch_size).min(self.order.len());
        self.position = end;

        let dataset = self.dataset;
        let indices = &self.order[start..end];
        Some(
            self.pool
                .install(|| indices.par_iter().map(|&i| dataset.get(i)).collect()),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.position).div_ceil(self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Batches<'_> {}
