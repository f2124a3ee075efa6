//! On-policy rollout storage.
//!
//! Transitions are stored step-major (`[env0_t0, env1_t0, ..., env0_t1, ...]`)
//! for `n_steps` vector steps.

use burn::prelude::*;
use rand::seq::SliceRandom;

use super::gae::{compute_gae, normalize_advantages};

/// One rollout of `n_steps * n_envs` transitions.
#[derive(Debug, Clone)]
pub struct RolloutBuffer {
    n_steps: usize,
    n_envs: usize,
    obs_size: usize,
    action_dim: usize,
    obs: Vec<f32>,
    actions: Vec<f32>,
    rewards: Vec<f32>,
    dones: Vec<bool>,
    values: Vec<f32>,
    log_probs: Vec<f32>,
    advantages: Vec<f32>,
    returns: Vec<f32>,
}

impl RolloutBuffer {
    pub fn new(n_steps: usize, n_envs: usize, obs_size: usize, action_dim: usize) -> Self {
        let capacity = n_steps * n_envs;
        Self {
            n_steps,
            n_envs,
            obs_size,
            action_dim,
            obs: Vec::with_capacity(capacity * obs_size),
            actions: Vec::with_capacity(capacity * action_dim),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            log_probs: Vec::with_capacity(capacity),
            advantages: Vec::new(),
            returns: Vec::new(),
        }
    }

    /// Store one vector step. All slices cover every environment.
    pub fn push(
        &mut self,
        obs: &[f32],
        actions: &[f32],
        rewards: &[f32],
        dones: &[bool],
        values: &[f32],
        log_probs: &[f32],
    ) {
        debug_assert_eq!(obs.len(), self.n_envs * self.obs_size);
        debug_assert_eq!(actions.len(), self.n_envs * self.action_dim);
        self.obs.extend_from_slice(obs);
        self.actions.extend_from_slice(actions);
        self.rewards.extend_from_slice(rewards);
        self.dones.extend_from_slice(dones);
        self.values.extend_from_slice(values);
        self.log_probs.extend_from_slice(log_probs);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.n_steps * self.n_envs
    }

    pub fn clear(&mut self) {
        self.obs.clear();
        self.actions.clear();
        self.rewards.clear();
        self.dones.clear();
        self.values.clear();
        self.log_probs.clear();
        self.advantages.clear();
        self.returns.clear();
    }

    /// Compute advantages and returns, bootstrapping from `last_values`.
    pub fn finish(&mut self, last_values: &[f32], gamma: f32, gae_lambda: f32) {
        let (advantages, returns) = compute_gae(
            &self.rewards,
            &self.values,
            &self.dones,
            last_values,
            gamma,
            gae_lambda,
        );
        self.advantages = advantages;
        self.returns = returns;
    }

    pub fn returns(&self) -> &[f32] {
        &self.returns
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Shuffled minibatches of at most `batch_size` transitions.
    pub fn minibatches(&self, batch_size: usize) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut rand::thread_rng());
        indices
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Tensors for the transitions at `indices`, advantages normalized
    /// within the minibatch.
    pub fn minibatch<B: Backend>(&self, indices: &[usize], device: &B::Device) -> Minibatch<B> {
        let n = indices.len();
        let mut obs = Vec::with_capacity(n * self.obs_size);
        let mut actions = Vec::with_capacity(n * self.action_dim);
        let mut advantages = Vec::with_capacity(n);
        let mut returns = Vec::with_capacity(n);
        let mut log_probs = Vec::with_capacity(n);

        for &i in indices {
            obs.extend_from_slice(&self.obs[i * self.obs_size..(i + 1) * self.obs_size]);
            actions.extend_from_slice(
                &self.actions[i * self.action_dim..(i + 1) * self.action_dim],
            );
            advantages.push(self.advantages[i]);
            returns.push(self.returns[i]);
            log_probs.push(self.log_probs[i]);
        }
        if n > 1 {
            normalize_advantages(&mut advantages);
        }

        let vector = |values: Vec<f32>| Tensor::<B, 1>::from_floats(values.as_slice(), device);
        Minibatch {
            obs: vector(obs).reshape([n, self.obs_size]),
            actions: vector(actions).reshape([n, self.action_dim]),
            advantages: vector(advantages),
            returns: vector(returns),
            old_log_probs: vector(log_probs),
        }
    }
}

/// Tensors for one gradient step.
#[derive(Debug, Clone)]
pub struct Minibatch<B: Backend> {
    pub obs: Tensor<B, 2>,
    pub actions: Tensor<B, 2>,
    pub advantages: Tensor<B, 1>,
    pub returns: Tensor<B, 1>,
    pub old_log_probs: Tensor<B, 1>,
}

fn variance(xs: &[f32]) -> f32 {
    let n = xs.len() as f32;
    let mean = xs.iter().sum::<f32>() / n;
    xs.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n
}

/// Fraction of return variance explained by the value estimates.
///
/// NaN when the returns have no variance.
pub fn explained_variance(values: &[f32], returns: &[f32]) -> f32 {
    let var_returns = variance(returns);
    if returns.is_empty() || var_returns == 0.0 {
        return f32::NAN;
    }
    let residuals: Vec<f32> = returns.iter().zip(values).map(|(r, v)| r - v).collect();
    1.0 - variance(&residuals) / var_returns
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn filled() -> RolloutBuffer {
        let mut buffer = RolloutBuffer::new(3, 2, 2, 1);
        for t in 0..3 {
            let t = t as f32;
            buffer.push(
                &[t, t, t + 10.0, t + 10.0],
                &[0.0, 1.0],
                &[1.0, 2.0],
                &[false, t == 1.0],
                &[0.5, 0.5],
                &[-0.7, -0.7],
            );
        }
        buffer
    }

    #[test]
    fn test_fill_and_clear() {
        let mut buffer = filled();
        assert!(buffer.is_full());
        assert_eq!(buffer.len(), 6);
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_minibatches_cover_rollout() {
        let buffer = filled();
        let batches = buffer.minibatches(4);
        assert_eq!(batches.len(), 2);
        let mut all: Vec<usize> = batches.concat();
        all.sort_unstable();
        assert_eq!(all, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_minibatch_tensors() {
        let mut buffer = filled();
        buffer.finish(&[0.0, 0.0], 0.99, 0.95);
        assert_eq!(buffer.returns().len(), 6);

        let mb = buffer.minibatch::<TestBackend>(&[1, 4], &Default::default());
        assert_eq!(mb.obs.dims(), [2, 2]);
        let obs = mb.obs.into_data().to_vec::<f32>().unwrap();
        assert_eq!(obs, vec![10.0, 10.0, 2.0, 2.0]);
        let actions = mb.actions.into_data().to_vec::<f32>().unwrap();
        assert_eq!(actions, vec![1.0, 0.0]);
    }

    #[test]
    fn test_explained_variance() {
        assert!((explained_variance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!(explained_variance(&[0.0, 0.0], &[1.0, 1.0]).is_nan());
        assert!(explained_variance(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]) < 1e-6);
    }
}
