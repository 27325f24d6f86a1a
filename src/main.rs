//! folder_finetune CLI
//!
//! `split` turns an image folder into train/validation/test manifests,
//! `train` fine-tunes ResNet-18 on a manifest, `stats` summarises one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use folder_finetune::backend::{backend_name, default_device, TrainingBackend};
use folder_finetune::dataset::{
    DatasetSplitter, LazyImageDataset, ManifestFormat, SplitConfig, ToTensor, Transform,
};
use folder_finetune::model::{ResNet18, ResNetConfig};
use folder_finetune::training::{train, TrainingConfig, TrainingSummary};
use folder_finetune::utils::logging::{init_logging, LogConfig};
use folder_finetune::utils::{format_duration, percent};

/// Split an image folder and fine-tune a classifier on it
#[derive(Parser, Debug)]
#[command(name = "folder_finetune")]
#[command(version)]
#[command(about = "Stratified dataset splits and ResNet fine-tuning with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose and --quiet
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split `<root>/<label>/<file>` into train/validation/test manifests
    Split(SplitArgs),

    /// Fine-tune ResNet-18 on a training manifest
    Train(TrainArgs),

    /// Show per-class counts of a manifest
    Stats {
        /// Manifest file
        #[arg(short, long)]
        manifest: PathBuf,

        /// Manifest line format (tab, space, jsonl)
        #[arg(short, long, default_value = "tab")]
        format: ManifestFormat,
    },
}

#[derive(Args, Debug)]
struct SplitArgs {
    /// Directory whose subdirectories are class labels
    #[arg(short, long)]
    root: PathBuf,

    /// Directory receiving the manifests
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// JSON split configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of validation samples
    #[arg(long)]
    validation_size: Option<usize>,

    /// Number of test samples
    #[arg(long)]
    test_size: Option<usize>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Manifest line format (tab, space, jsonl)
    #[arg(short, long)]
    format: Option<ManifestFormat>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Training manifest
    #[arg(short, long)]
    train: PathBuf,

    /// Validation manifest, evaluated after every epoch
    #[arg(long)]
    validation: Option<PathBuf>,

    /// JSON training configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Learning rate
    #[arg(short, long)]
    learning_rate: Option<f64>,

    /// Side length images are resized to
    #[arg(long)]
    image_size: Option<u32>,

    /// Threads decoding images
    #[arg(long)]
    workers: Option<usize>,

    /// Reshuffle the training set every epoch
    #[arg(long, default_value = "false")]
    shuffle: bool,

    /// Skip ImageNet normalization
    #[arg(long, default_value = "false")]
    no_normalize: bool,

    /// Random seed for shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Manifest line format (tab, space, jsonl)
    #[arg(short, long)]
    format: Option<ManifestFormat>,

    /// Burn record with pretrained ResNet-18 weights
    #[arg(long)]
    pretrained: Option<PathBuf>,

    /// Number of classes of the pretrained classifier
    #[arg(long)]
    pretrained_classes: Option<usize>,

    /// Write the training summary as JSON
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = init_logging(&log_config(&cli)?);

    match cli.command {
        Commands::Split(args) => cmd_split(args)?,
        Commands::Train(args) => cmd_train(args)?,
        Commands::Stats { manifest, format } => cmd_stats(&manifest, format)?,
    }

    Ok(())
}

fn log_config(cli: &Cli) -> Result<LogConfig> {
    Ok(match &cli.log_level {
        Some(name) => LogConfig::with_level_name(name)?,
        None if cli.verbose => LogConfig::verbose(),
        None if cli.quiet => LogConfig::quiet(),
        None => LogConfig::default(),
    })
}

fn cmd_split(args: SplitArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SplitConfig::load(path)
            .with_context(|| format!("failed to read split config {:?}", path))?,
        None => SplitConfig::default(),
    };
    if let Some(validation_size) = args.validation_size {
        config.validation_size = validation_size;
    }
    if let Some(test_size) = args.test_size {
        config.test_size = test_size;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(format) = args.format {
        config.format = format;
    }

    println!("{}", "Split Configuration:".cyan().bold());
    println!("  Root:            {:?}", args.root);
    println!("  Output:          {:?}", args.out_dir);
    println!("  Validation size: {}", config.validation_size);
    println!("  Test size:       {}", config.test_size);
    println!("  Seed:            {}", config.seed);
    println!("  Format:          {}", config.format);
    println!();

    let splitter = DatasetSplitter::new(config);
    let report = splitter
        .run(&args.root, &args.out_dir)
        .with_context(|| format!("failed to split {:?}", args.root))?;

    println!("{}", report);
    let paths = splitter.manifest_paths(&args.out_dir);
    println!("{}", "Manifests written:".green().bold());
    println!("  {:?}", paths.train);
    println!("  {:?}", paths.validation);
    println!("  {:?}", paths.test);
    Ok(())
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::load(path)
            .with_context(|| format!("failed to read training config {:?}", path))?,
        None => TrainingConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(image_size) = args.image_size {
        config.image_size = image_size;
    }
    if let Some(workers) = args.workers {
        config.num_workers = workers;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(pretrained) = args.pretrained {
        config.pretrained = Some(pretrained);
    }
    if let Some(classes) = args.pretrained_classes {
        config.pretrained_num_classes = classes;
    }
    config.shuffle |= args.shuffle;
    config.normalize &= !args.no_normalize;
    config.validate()?;

    let transform: Arc<dyn Transform> = Arc::new(config.transform());
    let train_set = LazyImageDataset::load_with(&args.train, config.format, Arc::clone(&transform))
        .with_context(|| format!("failed to load training manifest {:?}", args.train))?;
    let validation_set = args
        .validation
        .as_ref()
        .map(|path| {
            LazyImageDataset::load_with_index(
                path,
                config.format,
                Arc::clone(&transform),
                train_set.shared_label_index(),
            )
            .with_context(|| format!("failed to load validation manifest {:?}", path))
        })
        .transpose()?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backend:        {}", backend_name());
    println!("  Train samples:  {}", train_set.size());
    if let Some(validation) = &validation_set {
        println!("  Val samples:    {}", validation.size());
    }
    println!("  Classes:        {}", train_set.num_classes());
    println!("  Epochs:         {}", config.epochs);
    println!("  Batch size:     {}", config.batch_size);
    println!("  Learning rate:  {}", config.learning_rate);
    println!("  Image size:     {}", config.image_size);
    println!();

    let device = default_device();
    let model = match &config.pretrained {
        Some(path) => {
            let pretrained = ResNetConfig::new().with_num_classes(config.pretrained_num_classes);
            ResNet18::<TrainingBackend>::load_pretrained(&pretrained, path, &device)?
        }
        None => {
            info!("No pretrained weights given, starting from random initialisation");
            ResNet18::<TrainingBackend>::new(&ResNetConfig::new(), &device)
        }
    }
    .with_num_classes(train_set.num_classes(), &device);

    let (_model, summary) = train(model, &train_set, validation_set.as_ref(), &config, &device)?;

    print_summary(&summary);
    if let Some(path) = &args.summary {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write summary {:?}", path))?;
        println!("  Summary written to {:?}", path);
    }
    Ok(())
}

fn print_summary(summary: &TrainingSummary) {
    println!();
    println!("{}", "Training Complete!".green().bold());
    for record in &summary.epochs {
        let validation = record
            .validation_accuracy
            .map(|acc| format!(" | Val Acc: {:.2}%", acc * 100.0))
            .unwrap_or_default();
        println!(
            "  Epoch {:>3}: Loss: {:.4} | Mean: {:.4} | Train Acc: {:.2}%{}",
            record.epoch,
            record.last_loss,
            record.mean_loss,
            record.train_accuracy * 100.0,
            validation
        );
    }
    if let Some(best) = summary.best_validation_accuracy() {
        println!("  Best validation accuracy: {:.2}%", best * 100.0);
    }
    println!("  Elapsed: {}", format_duration(summary.elapsed_secs));
}

fn cmd_stats(manifest: &Path, format: ManifestFormat) -> Result<()> {
    info!("Computing statistics for {:?}", manifest);

    let dataset = LazyImageDataset::load_with(manifest, format, Arc::new(ToTensor))
        .with_context(|| format!("failed to load manifest {:?}", manifest))?;
    let total = dataset.size();

    println!("{}", "Manifest Statistics:".cyan().bold());
    println!("  Total samples: {}", total);
    println!("  Number of classes: {}", dataset.num_classes());
    println!();

    println!("{}", "Class Distribution:".cyan().bold());
    for (idx, count) in dataset.class_distribution().iter().enumerate() {
        let label = dataset.label_index().label(idx).unwrap_or("Unknown");
        println!("  {:40} {:>6} ({:>5.1}%)", label, count, percent(*count, total));
    }
    Ok(())
}
