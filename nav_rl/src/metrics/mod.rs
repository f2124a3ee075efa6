//! Training progress reporting.

mod logger;

pub use logger::{
    CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger, TrainingSnapshot, PROGRESS_FILE,
};
