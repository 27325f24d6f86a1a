//! Structured logging on `tracing`, and the per-epoch progress logger of the
//! training loop.

use std::str::FromStr;
use std::time::{Duration, Instant};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use super::error::{FinetuneError, Result};
use super::format_duration;

/// Subscriber options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    /// Print the module path of each event
    pub show_target: bool,
    /// Print thread ids, useful with several loader workers
    pub show_thread_ids: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            show_target: false,
            show_thread_ids: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Debug level with targets and thread ids
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            ..Self::default()
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Default config at the level named `name` (`trace` .. `error`)
    pub fn with_level_name(name: &str) -> Result<Self> {
        let level = Level::from_str(name)
            .map_err(|_| FinetuneError::Config(format!("unknown log level '{}'", name)))?;
        Ok(Self {
            level,
            ..Self::default()
        })
    }
}

/// Install the global subscriber; fails if one is already installed
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_ansi(config.ansi)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| FinetuneError::Config(format!("logging already initialised: {}", e)))
}

/// Logs epoch boundaries with loss, accuracy and remaining time
pub struct TrainingLogger {
    total_epochs: usize,
    current: usize,
    started: Instant,
    epoch_started: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        let now = Instant::now();
        Self {
            total_epochs,
            current: 0,
            started: now,
            epoch_started: now,
        }
    }

    /// Mark the start of epoch `epoch` (0-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.current = epoch;
        self.epoch_started = Instant::now();
        tracing::info!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// `last_loss` is the loss of the final batch of the epoch
    pub fn end_epoch(&self, last_loss: f64, mean_loss: f64, train_accuracy: f64) {
        tracing::info!(
            "Epoch {}/{}, Loss: {:.4} | Mean loss: {:.4} | Train Acc: {:.2}% | {} | ETA: {}",
            self.current + 1,
            self.total_epochs,
            last_loss,
            mean_loss,
            train_accuracy * 100.0,
            format_duration(self.epoch_started.elapsed().as_secs_f64()),
            format_duration(self.remaining().as_secs_f64())
        );
    }

    pub fn log_validation(&self, accuracy: f64, samples: usize) {
        tracing::info!(
            "Epoch {}/{} validation accuracy: {:.2}% ({} samples)",
            self.current + 1,
            self.total_epochs,
            accuracy * 100.0,
            samples
        );
    }

    pub fn log_complete(&self) {
        tracing::info!(
            "Finished {} epochs in {}",
            self.total_epochs,
            format_duration(self.started.elapsed().as_secs_f64())
        );
    }

    /// Mean epoch time so far times the epochs left
    fn remaining(&self) -> Duration {
        let done = self.current as u32 + 1;
        let left = self.total_epochs.saturating_sub(self.current + 1) as u32;
        self.started.elapsed() / done * left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::default().level, Level::INFO);
        assert_eq!(LogConfig::verbose().level, Level::DEBUG);
        assert!(LogConfig::verbose().show_thread_ids);
        assert_eq!(LogConfig::quiet().level, Level::ERROR);
    }

    #[test]
    fn test_level_names() {
        assert_eq!(LogConfig::with_level_name("warn").unwrap().level, Level::WARN);
        assert_eq!(LogConfig::with_level_name("TRACE").unwrap().level, Level::TRACE);
        assert!(LogConfig::with_level_name("loud").is_err());
    }

    #[test]
    fn test_no_time_remaining_after_last_epoch() {
        let mut logger = TrainingLogger::new(3);
        logger.start_epoch(2);
        assert_eq!(logger.remaining(), Duration::ZERO);
    }
}
