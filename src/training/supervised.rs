//! Supervised Training Implementation
//!
//! A plain training loop over Burn's autodiff API: the caller owns the
//! model and the device, the loop owns the optimizer.

use std::time::Instant;

use burn::{
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::burn_dataset::{ClassificationBatcher, LazyImageDataset};
use crate::dataset::loader::{BatchLoader, LoaderConfig};
use crate::model::ResNet18;
use crate::utils::error::{FinetuneError, Result};
use crate::utils::logging::TrainingLogger;

use super::config::TrainingConfig;

/// Metrics of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number
    pub epoch: usize,
    /// Loss of the last batch
    pub last_loss: f64,
    /// Mean batch loss over the epoch
    pub mean_loss: f64,
    /// Fraction of training samples predicted correctly during the epoch
    pub train_accuracy: f64,
    /// Accuracy on the validation set after the epoch, if one was given
    pub validation_accuracy: Option<f64>,
}

/// Outcome of [`train`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochRecord>,
    pub num_classes: usize,
    pub train_samples: usize,
    pub validation_samples: Option<usize>,
    pub elapsed_secs: f64,
}

impl TrainingSummary {
    pub fn last_epoch(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    /// Highest validation accuracy over all epochs
    pub fn best_validation_accuracy(&self) -> Option<f64> {
        self.epochs
            .iter()
            .filter_map(|e| e.validation_accuracy)
            .fold(None, |best, acc| Some(best.map_or(acc, |b: f64| b.max(acc))))
    }
}

/// Fine-tune `model` on `train_set` and return the trained model.
///
/// `validation_set` must use the same label index as `train_set`, and the
/// model's classifier must have one output per class.
pub fn train<B: AutodiffBackend>(
    mut model: ResNet18<B>,
    train_set: &LazyImageDataset,
    validation_set: Option<&LazyImageDataset>,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<(ResNet18<B>, TrainingSummary)> {
    config.validate()?;
    if train_set.is_empty() {
        return Err(FinetuneError::Config("training set is empty".to_string()));
    }
    if model.num_classes() != train_set.num_classes() {
        return Err(FinetuneError::Model(format!(
            "model has {} outputs but the training set has {} classes",
            model.num_classes(),
            train_set.num_classes()
        )));
    }
    if let Some(validation) = validation_set {
        if validation.label_index() != train_set.label_index() {
            return Err(FinetuneError::Config(
                "validation set must share the training label index".to_string(),
            ));
        }
    }

    let start = Instant::now();
    let batcher = ClassificationBatcher::new();
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut optimizer = AdamConfig::new().init::<B, ResNet18<B>>();
    let mut loader = BatchLoader::new(train_set, config.loader_config(config.shuffle))?;
    let mut logger = TrainingLogger::new(config.epochs);

    info!(
        "Training on {} samples ({} classes), {} batches per epoch",
        train_set.size(),
        train_set.num_classes(),
        loader.num_batches()
    );

    let mut summary = TrainingSummary {
        num_classes: train_set.num_classes(),
        train_samples: train_set.size(),
        validation_samples: validation_set.map(LazyImageDataset::size),
        ..Default::default()
    };

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        let progress = progress_bar(loader.num_batches());

        let mut loss_sum = 0.0f64;
        let mut last_loss = 0.0f64;
        let mut num_batches = 0usize;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for items in loader.epoch() {
            let batch = batcher.try_batch::<B>(items?, device)?;
            let batch_size = batch.targets.dims()[0];

            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            last_loss = loss.clone().into_scalar().elem::<f64>();
            loss_sum += last_loss;
            num_batches += 1;

            correct += count_correct(output, batch.targets);
            seen += batch_size;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            progress.set_message(format!("loss {:.4}", last_loss));
            progress.inc(1);
        }
        progress.finish_and_clear();

        let mean_loss = loss_sum / num_batches.max(1) as f64;
        let train_accuracy = correct as f64 / seen.max(1) as f64;
        logger.end_epoch(last_loss, mean_loss, train_accuracy);

        let validation_accuracy = match validation_set {
            Some(validation) => {
                let accuracy = evaluate(
                    &model.valid(),
                    validation,
                    config.loader_config(false),
                    device,
                )?;
                logger.log_validation(accuracy, validation.size());
                Some(accuracy)
            }
            None => None,
        };

        summary.epochs.push(EpochRecord {
            epoch: epoch + 1,
            last_loss,
            mean_loss,
            train_accuracy,
            validation_accuracy,
        });
    }

    logger.log_complete();
    summary.elapsed_secs = start.elapsed().as_secs_f64();
    Ok((model, summary))
}

/// Fraction of `dataset` classified correctly by `model`, in `[0, 1]`
pub fn evaluate<B: Backend>(
    model: &ResNet18<B>,
    dataset: &LazyImageDataset,
    loader_config: LoaderConfig,
    device: &B::Device,
) -> Result<f64> {
    let batcher = ClassificationBatcher::new();
    let mut loader = BatchLoader::new(dataset, loader_config)?;

    let mut correct = 0usize;
    let mut total = 0usize;
    for items in loader.epoch() {
        let batch = batcher.try_batch::<B>(items?, device)?;
        total += batch.targets.dims()[0];
        correct += count_correct(model.forward(batch.images), batch.targets);
    }

    debug!("Evaluated {} samples, {} correct", total, correct);
    Ok(if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    })
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}

fn progress_bar(len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style);
    progress
}
