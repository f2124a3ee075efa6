//! Training progress loggers.
//!
//! One [`TrainingSnapshot`] is produced per PPO iteration (rollout plus
//! update) and handed to every configured backend.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::error::{Error, Result};

/// File name of the CSV progress log inside the tensorboard directory.
pub const PROGRESS_FILE: &str = "progress.csv";

/// Progress after one training iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSnapshot {
    pub iteration: usize,
    /// Environment steps collected so far in this run.
    pub timesteps: u64,
    /// Episodes finished by the training envs so far.
    pub episodes: usize,
    /// Mean reward over recent training episodes (NaN before the first).
    pub ep_rew_mean: f32,
    /// Mean length over recent training episodes (NaN before the first).
    pub ep_len_mean: f32,
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    pub explained_variance: f32,
    pub learning_rate: f64,
}

impl TrainingSnapshot {
    pub fn new(iteration: usize, timesteps: u64, episodes: usize) -> Self {
        Self {
            iteration,
            timesteps,
            episodes,
            ep_rew_mean: f32::NAN,
            ep_len_mean: f32::NAN,
            policy_loss: 0.0,
            value_loss: 0.0,
            entropy: 0.0,
            explained_variance: f32::NAN,
            learning_rate: 0.0,
        }
    }

    pub fn with_episode_stats(mut self, ep_rew_mean: f32, ep_len_mean: f32) -> Self {
        self.ep_rew_mean = ep_rew_mean;
        self.ep_len_mean = ep_len_mean;
        self
    }

    pub fn with_losses(mut self, policy_loss: f32, value_loss: f32, entropy: f32) -> Self {
        self.policy_loss = policy_loss;
        self.value_loss = value_loss;
        self.entropy = entropy;
        self
    }

    pub fn with_explained_variance(mut self, explained_variance: f32) -> Self {
        self.explained_variance = explained_variance;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }
}

/// A destination for training progress.
pub trait MetricsLogger: Send {
    fn log(&mut self, snapshot: &TrainingSnapshot);

    fn flush(&mut self);
}

/// Console table, one row per iteration.
pub struct ConsoleLogger {
    start_time: Instant,
    show_header: bool,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            show_header: true,
        }
    }

    fn print_header(&self) {
        println!(
            "{:>6} {:>12} {:>8} {:>10} {:>8} {:>10} {:>10} {:>8} {:>8} {:>7}",
            "Iter", "Timesteps", "Episodes", "EpRew", "EpLen", "Policy", "Value", "Entropy",
            "ExplVar", "FPS"
        );
        println!("{}", "-".repeat(96));
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

fn fps(timesteps: u64, start: Instant) -> f32 {
    let elapsed = start.elapsed().as_secs_f32();
    if elapsed > 0.0 {
        timesteps as f32 / elapsed
    } else {
        0.0
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        if self.show_header {
            self.print_header();
            self.show_header = false;
        }
        println!(
            "{:>6} {:>12} {:>8} {:>10.2} {:>8.1} {:>10.4} {:>10.4} {:>8.4} {:>8.3} {:>7.0}",
            snapshot.iteration,
            snapshot.timesteps,
            snapshot.episodes,
            snapshot.ep_rew_mean,
            snapshot.ep_len_mean,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
            snapshot.explained_variance,
            fps(snapshot.timesteps, self.start_time)
        );
    }

    fn flush(&mut self) {}
}

/// CSV progress log for later plotting.
pub struct CSVLogger {
    writer: BufWriter<File>,
    start_time: Instant,
}

impl CSVLogger {
    /// Create `path`, truncating an existing file, and write the header.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "iteration,timesteps,episodes,ep_rew_mean,ep_len_mean,policy_loss,value_loss,entropy,explained_variance,learning_rate,elapsed_secs,fps"
        )
        .map_err(|e| Error::io(path, e))?;

        Ok(Self {
            writer,
            start_time: Instant::now(),
        })
    }

    /// Progress log inside a tensorboard directory.
    pub fn in_dir(dir: &Path) -> Result<Self> {
        Self::new(dir.join(PROGRESS_FILE))
    }
}

impl MetricsLogger for CSVLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        let result = writeln!(
            self.writer,
            "{},{},{},{:.4},{:.2},{:.6},{:.6},{:.6},{:.4},{:.8},{:.2},{:.2}",
            snapshot.iteration,
            snapshot.timesteps,
            snapshot.episodes,
            snapshot.ep_rew_mean,
            snapshot.ep_len_mean,
            snapshot.policy_loss,
            snapshot.value_loss,
            snapshot.entropy,
            snapshot.explained_variance,
            snapshot.learning_rate,
            elapsed,
            fps(snapshot.timesteps, self.start_time)
        );
        if let Err(e) = result {
            log::warn!("Failed to write progress row: {}", e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::warn!("Failed to flush progress log: {}", e);
        }
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Fans snapshots out to several loggers.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, snapshot: &TrainingSnapshot) {
        for logger in &mut self.loggers {
            logger.log(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Recording(Arc<Mutex<Vec<TrainingSnapshot>>>);

    impl MetricsLogger for Recording {
        fn log(&mut self, snapshot: &TrainingSnapshot) {
            self.0.lock().push(snapshot.clone());
        }
        fn flush(&mut self) {}
    }

    #[test]
    fn test_snapshot_builder() {
        let snapshot = TrainingSnapshot::new(3, 6144, 12)
            .with_episode_stats(4.5, 120.0)
            .with_losses(-0.01, 0.3, 1.2)
            .with_learning_rate(3e-4);
        assert_eq!(snapshot.iteration, 3);
        assert_eq!(snapshot.ep_rew_mean, 4.5);
        assert_eq!(snapshot.entropy, 1.2);
        assert!(snapshot.explained_variance.is_nan());
    }

    #[test]
    fn test_csv_logger_writes_rows() {
        let dir = TempDir::new().unwrap();
        {
            let mut logger = CSVLogger::in_dir(dir.path()).unwrap();
            logger.log(&TrainingSnapshot::new(1, 2048, 3));
            logger.log(&TrainingSnapshot::new(2, 4096, 7));
        }
        let content = std::fs::read_to_string(dir.path().join(PROGRESS_FILE)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("iteration,timesteps"));
        assert!(lines[2].starts_with("2,4096,7,"));
    }

    #[test]
    fn test_multi_logger_fans_out() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut multi = MultiLogger::new()
            .add(Recording(seen.clone()))
            .add(Recording(seen.clone()));
        assert!(!multi.is_empty());
        multi.log(&TrainingSnapshot::new(1, 10, 0));
        multi.flush();
        assert_eq!(seen.lock().len(), 2);
    }
}
