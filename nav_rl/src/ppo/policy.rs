//! Action distributions over network outputs.
//!
//! - Discrete spaces: categorical over logits
//! - Continuous spaces: diagonal Gaussian with state-independent log std;
//!   samples are stored unclipped and clipped to the bounds by the env
//!
//! Actions are stored in rollouts as `f32` rows: the action index for
//! discrete spaces, the raw Gaussian sample for continuous ones.

use burn::prelude::*;
use burn::tensor::activation::log_softmax;

use super::network::PolicyOutput;
use crate::env::Action;
use crate::error::{Error, Result};

const LOG_STD_MIN: f32 = -20.0;
const LOG_STD_MAX: f32 = 2.0;

fn half_log_2pi() -> f32 {
    0.5 * (2.0 * std::f32::consts::PI).ln()
}

/// Sampled actions for a batch of observations.
#[derive(Debug, Clone, Default)]
pub struct SampledActions {
    pub actions: Vec<Action>,
    /// Flat `[batch * action_dim]` rows as stored in the rollout.
    pub raw: Vec<f32>,
    pub log_probs: Vec<f32>,
}

/// Distribution over actions for a batch.
pub enum ActionDistribution<B: Backend> {
    Categorical { logits: Tensor<B, 2> },
    Gaussian { mean: Tensor<B, 2>, log_std: Tensor<B, 2> },
}

pub(crate) fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| Error::Tensor(format!("{:?}", e)))
}

impl<B: Backend> ActionDistribution<B> {
    pub fn from_output(output: &PolicyOutput<B>) -> Self {
        match &output.log_std {
            None => ActionDistribution::Categorical {
                logits: output.action.clone(),
            },
            Some(log_std) => ActionDistribution::Gaussian {
                mean: output.action.clone(),
                log_std: log_std.clone().clamp(LOG_STD_MIN, LOG_STD_MAX),
            },
        }
    }

    /// Columns per stored action row.
    pub fn action_dim(&self) -> usize {
        match self {
            ActionDistribution::Categorical { .. } => 1,
            ActionDistribution::Gaussian { mean, .. } => mean.dims()[1],
        }
    }

    /// Log probability of stored action rows `[batch, action_dim]`.
    pub fn log_prob(&self, actions: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            ActionDistribution::Categorical { logits } => {
                let [batch, _] = logits.dims();
                log_softmax(logits.clone(), 1)
                    .gather(1, actions.int())
                    .reshape([batch])
            }
            ActionDistribution::Gaussian { mean, log_std } => {
                let [batch, _] = mean.dims();
                let z = (actions - mean.clone()) / log_std.clone().exp();
                (z.powf_scalar(2.0).mul_scalar(-0.5) - log_std.clone())
                    .sub_scalar(half_log_2pi())
                    .sum_dim(1)
                    .reshape([batch])
            }
        }
    }

    /// Per-sample entropy `[batch]`.
    pub fn entropy(&self) -> Tensor<B, 1> {
        match self {
            ActionDistribution::Categorical { logits } => {
                let [batch, _] = logits.dims();
                let log_p = log_softmax(logits.clone(), 1);
                let p = log_p.clone().exp();
                (p * log_p).sum_dim(1).reshape([batch]).neg()
            }
            ActionDistribution::Gaussian { log_std, .. } => {
                let [batch, _] = log_std.dims();
                log_std
                    .clone()
                    .add_scalar(0.5 + half_log_2pi())
                    .sum_dim(1)
                    .reshape([batch])
            }
        }
    }

    /// Draw one action per row, or take the mode when `deterministic`.
    pub fn sample(&self, deterministic: bool) -> Result<SampledActions> {
        match self {
            ActionDistribution::Categorical { logits } => {
                let [batch, n_actions] = logits.dims();
                let log_p = to_vec(log_softmax(logits.clone(), 1))?;
                let mut out = SampledActions::default();
                for row in log_p.chunks_exact(n_actions).take(batch) {
                    let selected = if deterministic {
                        argmax(row)
                    } else {
                        categorical(row)
                    };
                    out.actions.push(Action::Discrete(selected));
                    out.raw.push(selected as f32);
                    out.log_probs.push(row[selected]);
                }
                Ok(out)
            }
            ActionDistribution::Gaussian { mean, log_std } => {
                let [batch, dim] = mean.dims();
                let mean = to_vec(mean.clone())?;
                let log_std = to_vec(log_std.clone())?;
                let mut out = SampledActions::default();
                for b in 0..batch {
                    let mut action = Vec::with_capacity(dim);
                    let mut log_prob = 0.0;
                    for d in 0..dim {
                        let i = b * dim + d;
                        let noise = if deterministic { 0.0 } else { standard_normal() };
                        action.push(mean[i] + log_std[i].exp() * noise);
                        log_prob += -0.5 * noise * noise - log_std[i] - half_log_2pi();
                    }
                    out.raw.extend_from_slice(&action);
                    out.actions.push(Action::Continuous(action));
                    out.log_probs.push(log_prob);
                }
                Ok(out)
            }
        }
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

/// Inverse-CDF draw from log probabilities; falls back to the last action
/// when rounding leaves the cumulative sum short of one.
fn categorical(log_probs: &[f32]) -> usize {
    let u = fastrand::f32();
    let mut cumsum = 0.0;
    for (i, lp) in log_probs.iter().enumerate() {
        cumsum += lp.exp();
        if u < cumsum {
            return i;
        }
    }
    log_probs.len().saturating_sub(1)
}

fn standard_normal() -> f32 {
    let u1 = fastrand::f32().max(f32::MIN_POSITIVE);
    let u2 = fastrand::f32();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}
