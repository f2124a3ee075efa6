//! Training callbacks.
//!
//! [`TrainingCallback`]s run after every vector step of
//! [`PpoAgent::learn`](crate::ppo::PpoAgent::learn). The [`EvalCallback`]
//! periodically evaluates the policy and hands the outcome to
//! [`EvalHook`]s, which may move the curriculum or stop training.

mod eval;
mod stop;
mod train_stage;

pub use eval::{evaluate_policy, EvalCallback, EvalConfig, EvalResult, EVALUATIONS_FILE};
pub use stop::StopTrainingOnRewardThreshold;
pub use train_stage::InitiateNewTrainStage;

use std::fmt;
use std::str::FromStr;

use crate::env::VecEnv;
use crate::error::{Error, Result};
use crate::ppo::Policy;

/// What a callback sees of the running training.
pub struct CallbackContext<'a> {
    pub policy: &'a dyn Policy,
    pub train_env: &'a dyn VecEnv,
    /// Environment steps collected in this run.
    pub num_timesteps: u64,
}

/// Hook into the training loop.
pub trait TrainingCallback {
    fn on_training_start(&mut self, _ctx: &CallbackContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after every vector step; `false` stops training.
    fn on_step(&mut self, ctx: &CallbackContext<'_>) -> Result<bool>;
}

/// Evaluation bookkeeping shared with [`EvalHook`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalState {
    pub best_mean_reward: f64,
    pub last_mean_reward: f64,
    /// Success rate of the last evaluation, `-inf` before the first.
    pub last_success_rate: f64,
    pub n_eval_episodes: usize,
    pub num_timesteps: u64,
}

impl EvalState {
    pub fn new(n_eval_episodes: usize) -> Self {
        Self {
            best_mean_reward: f64::NEG_INFINITY,
            last_mean_reward: f64::NEG_INFINITY,
            last_success_rate: f64::NEG_INFINITY,
            n_eval_episodes,
            num_timesteps: 0,
        }
    }
}

/// Runs after an evaluation; `false` stops training.
pub trait EvalHook {
    fn on_eval(&mut self, state: &mut EvalState) -> Result<bool>;
}

/// Metric compared against curriculum and stopping thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdType {
    /// Success rate of the last evaluation.
    Succ,
    /// Best mean evaluation reward.
    Rew,
}

impl ThresholdType {
    /// Current value of the metric.
    pub fn value(&self, state: &EvalState) -> f64 {
        match self {
            ThresholdType::Succ => state.last_success_rate,
            ThresholdType::Rew => state.best_mean_reward,
        }
    }
}

impl FromStr for ThresholdType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "succ" => Ok(ThresholdType::Succ),
            "rew" => Ok(ThresholdType::Rew),
            other => Err(Error::invalid(
                "threshold_type",
                format!("unknown threshold type '{}', expected 'succ' or 'rew'", other),
            )),
        }
    }
}

impl fmt::Display for ThresholdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ThresholdType::Succ => "succ",
            ThresholdType::Rew => "rew",
        })
    }
}
