//! Running statistics using Welford's online algorithm.
//!
//! Numerically stable running mean and variance, used to normalize
//! observations (per dimension) and returns (scalar) during training.
//!
//! # Example
//! ```ignore
//! use nav_rl::core::RunningMeanStd;
//!
//! let mut stats = RunningMeanStd::new(2);
//! stats.update(&[1.0, 2.0]);
//! stats.update(&[2.0, 3.0]);
//!
//! let normalized = stats.normalize(&[1.5, 2.5], 10.0);
//! ```

use serde::{Deserialize, Serialize};

/// Running mean and variance per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningMeanStd {
    /// Running mean per dimension
    mean: Vec<f64>,
    /// Sum of squared deviations per dimension (variance = var_sum / count)
    var_sum: Vec<f64>,
    /// Number of samples seen
    count: f64,
    /// Added to the variance before taking the square root
    epsilon: f64,
}

impl RunningMeanStd {
    /// Statistics for `dim` dimensions.
    pub fn new(dim: usize) -> Self {
        Self::with_epsilon(dim, 1e-8)
    }

    pub fn with_epsilon(dim: usize, epsilon: f64) -> Self {
        Self {
            mean: vec![0.0; dim],
            var_sum: vec![0.0; dim],
            count: 0.0,
            epsilon,
        }
    }

    /// Add one sample.
    ///
    /// # Panics
    /// Panics if the sample length doesn't match the dimensionality.
    pub fn update(&mut self, obs: &[f32]) {
        assert_eq!(obs.len(), self.mean.len(), "Observation dimension mismatch");

        self.count += 1.0;
        for (i, &x) in obs.iter().enumerate() {
            let x = x as f64;
            let delta = x - self.mean[i];
            self.mean[i] += delta / self.count;
            let delta2 = x - self.mean[i];
            self.var_sum[i] += delta * delta2;
        }
    }

    /// Add a flat batch `[obs1, obs2, ...]` of samples.
    pub fn update_batch(&mut self, batch: &[f32]) {
        let dim = self.mean.len();
        assert_eq!(batch.len() % dim.max(1), 0, "Batch size must be multiple of dimension");

        for obs in batch.chunks_exact(dim.max(1)) {
            self.update(obs);
        }
    }

    /// Standard deviation of dimension `i`.
    #[inline]
    fn std(&self, i: usize) -> f64 {
        if self.count < 2.0 {
            1.0
        } else {
            (self.var_sum[i] / self.count + self.epsilon).sqrt()
        }
    }

    /// Normalize to zero mean and unit variance, clipped to `[-clip, clip]`.
    pub fn normalize(&self, obs: &[f32], clip: f32) -> Vec<f32> {
        let mut out = obs.to_vec();
        self.normalize_inplace(&mut out, clip);
        out
    }

    /// Normalize a flat batch of samples in place.
    pub fn normalize_inplace(&self, batch: &mut [f32], clip: f32) {
        let dim = self.mean.len();
        assert_eq!(batch.len() % dim.max(1), 0, "Observation dimension mismatch");

        for obs in batch.chunks_exact_mut(dim.max(1)) {
            for (i, x) in obs.iter_mut().enumerate() {
                let z = ((*x as f64 - self.mean[i]) / self.std(i)) as f32;
                *x = z.clamp(-clip, clip);
            }
        }
    }

    /// Scale values by the standard deviation only (no centering).
    pub fn scale(&self, x: f32) -> f32 {
        (x as f64 / self.std(0)) as f32
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Population variance per dimension.
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2.0 {
            vec![1.0; self.mean.len()]
        } else {
            self.var_sum.iter().map(|&v| v / self.count).collect()
        }
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Replace our statistics with another tracker's.
    pub fn sync_with(&mut self, other: &RunningMeanStd) {
        assert_eq!(self.mean.len(), other.mean.len(), "Dimension mismatch in sync");
        self.mean.copy_from_slice(&other.mean);
        self.var_sum.copy_from_slice(&other.var_sum);
        self.count = other.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let mut stats = RunningMeanStd::new(2);
        stats.update_batch(&[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);

        assert_eq!(stats.count(), 3.0);
        assert!((stats.mean()[0] - 2.0).abs() < 1e-9);
        assert!((stats.mean()[1] - 20.0).abs() < 1e-9);
        let var = stats.variance();
        assert!((var[0] - 2.0 / 3.0).abs() < 1e-9);
        assert!((var[1] - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_and_clip() {
        let mut stats = RunningMeanStd::new(1);
        for x in [0.0, 2.0, 4.0] {
            stats.update(&[x]);
        }
        let z = stats.normalize(&[2.0], 10.0);
        assert!(z[0].abs() < 1e-6);

        let clipped = stats.normalize(&[1000.0], 5.0);
        assert_eq!(clipped[0], 5.0);
    }

    #[test]
    fn test_too_few_samples_pass_through() {
        let stats = RunningMeanStd::new(2);
        assert_eq!(stats.normalize(&[3.0, -1.0], 10.0), vec![3.0, -1.0]);
    }

    #[test]
    fn test_sync_with() {
        let mut a = RunningMeanStd::new(1);
        a.update_batch(&[1.0, 2.0, 3.0]);
        let mut b = RunningMeanStd::new(1);
        b.sync_with(&a);
        assert_eq!(a, b);
    }
}
