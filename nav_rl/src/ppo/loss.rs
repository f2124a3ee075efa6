//! Clipped-surrogate PPO loss.
//!
//! total = -min(r A, clip(r, 1-ε, 1+ε) A) + c_v (V - R)^2 - c_e H
//!
//! The log ratio is clamped before `exp` so a diverged policy produces a
//! large but finite ratio.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::error::{Error, Result};

const MAX_LOG_RATIO: f32 = 20.0;

/// Negative clipped surrogate objective, averaged over the minibatch.
pub fn ppo_clip_loss<B: Backend>(
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_range: f32,
) -> Tensor<B, 1> {
    let ratio = (log_probs - old_log_probs)
        .clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO)
        .exp();
    let clipped = ratio.clone().clamp(1.0 - clip_range, 1.0 + clip_range);
    let surr1 = ratio * advantages.clone();
    let surr2 = clipped * advantages;
    -surr1.min_pair(surr2).mean()
}

/// Mean squared error between value predictions and returns.
pub fn value_loss<B: Backend>(values: Tensor<B, 1>, returns: Tensor<B, 1>) -> Tensor<B, 1> {
    (values - returns).powf_scalar(2.0).mean()
}

/// Scalar parts of a minibatch loss, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossComponents {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
}

/// Combined loss and its logged components.
pub fn ppo_loss<B: Backend>(
    log_probs: Tensor<B, 1>,
    old_log_probs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    values: Tensor<B, 1>,
    returns: Tensor<B, 1>,
    entropy: Tensor<B, 1>,
    clip_range: f32,
    vf_coef: f32,
    ent_coef: f32,
) -> Result<(Tensor<B, 1>, LossComponents)> {
    let policy = ppo_clip_loss(log_probs, old_log_probs, advantages, clip_range);
    let value = value_loss(values, returns);
    let entropy = entropy.mean();

    let components = LossComponents {
        policy_loss: scalar(&policy)?,
        value_loss: scalar(&value)?,
        entropy: scalar(&entropy)?,
    };
    let total = policy + value.mul_scalar(vf_coef) - entropy.mul_scalar(ent_coef);
    Ok((total, components))
}

/// First element of a tensor as `f32`.
pub(crate) fn scalar<B: Backend>(tensor: &Tensor<B, 1>) -> Result<f32> {
    let values = tensor
        .clone()
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| Error::Tensor(format!("{:?}", e)))?;
    values
        .first()
        .copied()
        .ok_or_else(|| Error::Tensor("empty tensor".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn t(values: &[f32]) -> Tensor<TestBackend, 1> {
        Tensor::from_floats(values, &Default::default())
    }

    #[test]
    fn test_unit_ratio_is_mean_advantage() {
        let loss = ppo_clip_loss(t(&[-1.0, -1.0]), t(&[-1.0, -1.0]), t(&[1.0, 3.0]), 0.2);
        assert!((scalar(&loss).unwrap() + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_large_ratio_is_clipped() {
        // ratio e, clipped to 1.2 for a positive advantage
        let loss = ppo_clip_loss(t(&[0.0]), t(&[-1.0]), t(&[1.0]), 0.2);
        assert!((scalar(&loss).unwrap() + 1.2).abs() < 1e-5);
    }

    #[test]
    fn test_negative_advantage_keeps_pessimistic_bound() {
        // ratio e with A = -1: min(-e, -1.2) = -e
        let loss = ppo_clip_loss(t(&[0.0]), t(&[-1.0]), t(&[-1.0]), 0.2);
        assert!((scalar(&loss).unwrap() - std::f32::consts::E).abs() < 1e-4);
    }

    #[test]
    fn test_combined_loss() {
        let (total, parts) = ppo_loss(
            t(&[0.0, 0.0]),
            t(&[0.0, 0.0]),
            t(&[1.0, 1.0]),
            t(&[1.0, 2.0]),
            t(&[2.0, 4.0]),
            t(&[0.5, 0.5]),
            0.2,
            0.5,
            0.1,
        )
        .unwrap();
        assert!((parts.policy_loss + 1.0).abs() < 1e-6);
        assert!((parts.value_loss - 2.5).abs() < 1e-6);
        assert!((parts.entropy - 0.5).abs() < 1e-6);
        // -1 + 0.5 * 2.5 - 0.1 * 0.5
        assert!((scalar(&total).unwrap() - 0.2).abs() < 1e-5);
    }
}
