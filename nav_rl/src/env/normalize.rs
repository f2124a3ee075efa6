//! Running normalization over a vectorized environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::vec_env::{VecEnv, VecStep};
use super::{Action, ActionSpace};
use crate::core::RunningMeanStd;
use crate::error::{Error, Result};
use crate::files::{read_json, write_json};

/// Normalization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VecNormalizeConfig {
    /// Update statistics while stepping.
    pub training: bool,
    pub norm_obs: bool,
    pub norm_reward: bool,
    pub clip_obs: f32,
    pub clip_reward: f32,
    /// Discount used for the running return when normalizing rewards.
    pub gamma: f64,
}

impl Default for VecNormalizeConfig {
    fn default() -> Self {
        Self {
            training: true,
            norm_obs: true,
            norm_reward: false,
            clip_obs: 10.0,
            clip_reward: 15.0,
            gamma: 0.99,
        }
    }
}

impl VecNormalizeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_training(mut self, training: bool) -> Self {
        self.training = training;
        self
    }

    pub fn with_norm_obs(mut self, norm_obs: bool) -> Self {
        self.norm_obs = norm_obs;
        self
    }

    pub fn with_norm_reward(mut self, norm_reward: bool) -> Self {
        self.norm_reward = norm_reward;
        self
    }

    pub fn with_clip_obs(mut self, clip_obs: f32) -> Self {
        self.clip_obs = clip_obs;
        self
    }

    pub fn with_clip_reward(mut self, clip_reward: f32) -> Self {
        self.clip_reward = clip_reward;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }
}

/// Statistics shared between training and evaluation batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub obs: RunningMeanStd,
    pub ret: RunningMeanStd,
}

impl NormalizationStats {
    pub fn new(obs_size: usize) -> Self {
        Self {
            obs: RunningMeanStd::new(obs_size),
            ret: RunningMeanStd::new(1),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SavedNormalization {
    config: VecNormalizeConfig,
    stats: NormalizationStats,
}

/// Normalizes observations (and optionally rewards) of the wrapped batch.
pub struct VecNormalize<V: VecEnv> {
    venv: V,
    config: VecNormalizeConfig,
    stats: NormalizationStats,
    /// Discounted running return per environment.
    returns: Vec<f64>,
}

impl<V: VecEnv> VecNormalize<V> {
    pub fn new(venv: V, config: VecNormalizeConfig) -> Self {
        let stats = NormalizationStats::new(venv.obs_size());
        let returns = vec![0.0; venv.n_envs()];
        Self {
            venv,
            config,
            stats,
            returns,
        }
    }

    /// Wrap `venv` with settings and statistics saved by [`VecNormalize::save`].
    pub fn load(path: &Path, venv: V) -> Result<Self> {
        let saved: SavedNormalization = read_json(path)?;
        if saved.stats.obs.dim() != venv.obs_size() {
            return Err(Error::invalid(
                "vec_normalize",
                format!(
                    "'{}' holds statistics for {} observation values, the environment has {}",
                    path.display(),
                    saved.stats.obs.dim(),
                    venv.obs_size()
                ),
            ));
        }
        let returns = vec![0.0; venv.n_envs()];
        Ok(Self {
            venv,
            config: saved.config,
            stats: saved.stats,
            returns,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let saved = SavedNormalization {
            config: self.config.clone(),
            stats: self.stats.clone(),
        };
        write_json(path, &saved)
    }

    pub fn config(&self) -> &VecNormalizeConfig {
        &self.config
    }

    pub fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    fn normalize_obs(&self, obs: &mut [f32]) {
        if self.config.norm_obs {
            self.stats.obs.normalize_inplace(obs, self.config.clip_obs);
        }
    }

    fn normalize_rewards(&mut self, step: &mut VecStep) {
        if !self.config.norm_reward {
            return;
        }
        for (i, r) in step.rewards.iter().enumerate() {
            self.returns[i] = self.returns[i] * self.config.gamma + *r as f64;
        }
        if self.config.training {
            for ret in &self.returns {
                self.stats.ret.update(&[*ret as f32]);
            }
        }
        let clip = self.config.clip_reward;
        for (i, r) in step.rewards.iter_mut().enumerate() {
            *r = self.stats.ret.scale(*r).clamp(-clip, clip);
            if step.terminals[i] || step.truncations[i] {
                self.returns[i] = 0.0;
            }
        }
    }
}

impl<V: VecEnv> VecEnv for VecNormalize<V> {
    fn n_envs(&self) -> usize {
        self.venv.n_envs()
    }

    fn obs_size(&self) -> usize {
        self.venv.obs_size()
    }

    fn scan_size(&self) -> usize {
        self.venv.scan_size()
    }

    fn action_space(&self) -> &ActionSpace {
        self.venv.action_space()
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        let mut obs = self.venv.reset()?;
        self.returns.iter_mut().for_each(|r| *r = 0.0);
        if self.config.training && self.config.norm_obs {
            self.stats.obs.update_batch(&obs);
        }
        self.normalize_obs(&mut obs);
        Ok(obs)
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        let mut step = self.venv.step(actions)?;
        if self.config.training && self.config.norm_obs {
            self.stats.obs.update_batch(&step.obs);
        }
        let mut obs = std::mem::take(&mut step.obs);
        self.normalize_obs(&mut obs);
        step.obs = obs;
        for final_obs in step.final_obs.iter_mut().flatten() {
            self.normalize_obs(final_obs);
        }
        self.normalize_rewards(&mut step);
        Ok(step)
    }

    fn close(&mut self) -> Result<()> {
        self.venv.close()
    }

    fn normalization(&self) -> Option<NormalizationStats> {
        Some(self.stats.clone())
    }

    fn set_normalization(&mut self, stats: &NormalizationStats) {
        self.stats.obs.sync_with(&stats.obs);
        self.stats.ret.sync_with(&stats.ret);
    }

    fn set_training(&mut self, training: bool) {
        self.config.training = training;
    }

    fn save_normalization(&self, path: &Path) -> Result<bool> {
        self.save(path)?;
        Ok(true)
    }
}
