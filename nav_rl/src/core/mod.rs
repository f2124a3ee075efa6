//! Core data structures shared across training components.

pub mod running_stats;

pub use running_stats::RunningMeanStd;
