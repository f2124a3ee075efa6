//! PPO agent: rollout collection, clipped-surrogate updates and persistence.

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::loss::{ppo_loss, LossComponents};
use super::network::{NetworkShape, PolicyNet};
use super::policy::{to_vec, ActionDistribution, SampledActions};
use super::rollout::{explained_variance, RolloutBuffer};
use crate::agents::PolicyArchitecture;
use crate::callbacks::{CallbackContext, TrainingCallback};
use crate::checkpoint::{load_policy, save_policy, CheckpointMeta};
use crate::env::{Action, VecEnv};
use crate::error::{Error, Result};
use crate::hyperparams::Hyperparameters;
use crate::metrics::{MetricsLogger, MultiLogger, TrainingSnapshot};

/// Episodes kept for the rolling reward/length means.
const EPISODE_WINDOW: usize = 100;

// ============================================================================
// Settings
// ============================================================================

/// Learning hyperparameters of the PPO update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PpoSettings {
    pub gamma: f64,
    /// Vector steps per rollout.
    pub n_steps: usize,
    pub ent_coef: f64,
    pub learning_rate: f64,
    pub vf_coef: f64,
    pub max_grad_norm: f64,
    pub gae_lambda: f64,
    /// Minibatch size.
    pub batch_size: usize,
    pub n_epochs: usize,
    pub clip_range: f64,
}

impl Default for PpoSettings {
    fn default() -> Self {
        Self::from_hyperparameters(&Hyperparameters::default())
    }
}

impl PpoSettings {
    /// Settings of an agent record; the minibatch size is `m_batch_size`.
    pub fn from_hyperparameters(params: &Hyperparameters) -> Self {
        Self {
            gamma: params.gamma,
            n_steps: params.n_steps,
            ent_coef: params.ent_coef,
            learning_rate: params.learning_rate,
            vf_coef: params.vf_coef,
            max_grad_norm: params.max_grad_norm,
            gae_lambda: params.gae_lambda,
            batch_size: params.m_batch_size,
            n_epochs: params.n_epochs,
            clip_range: params.clip_range,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_steps == 0 {
            return Err(Error::invalid("n_steps", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid("m_batch_size", "must be positive"));
        }
        if self.n_epochs == 0 {
            return Err(Error::invalid("n_epochs", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.gamma) || !(0.0..=1.0).contains(&self.gae_lambda) {
            return Err(Error::invalid("gamma", "gamma and gae_lambda must lie in [0, 1]"));
        }
        if self.clip_range <= 0.0 || self.learning_rate <= 0.0 {
            return Err(Error::invalid(
                "clip_range",
                "clip range and learning rate must be positive",
            ));
        }
        Ok(())
    }

    fn entries(&self) -> [(&'static str, String); 10] {
        [
            ("gamma", self.gamma.to_string()),
            ("n_steps", self.n_steps.to_string()),
            ("ent_coef", self.ent_coef.to_string()),
            ("learning_rate", self.learning_rate.to_string()),
            ("vf_coef", self.vf_coef.to_string()),
            ("max_grad_norm", self.max_grad_norm.to_string()),
            ("gae_lambda", self.gae_lambda.to_string()),
            ("batch_size", self.batch_size.to_string()),
            ("n_epochs", self.n_epochs.to_string()),
            ("clip_range", self.clip_range.to_string()),
        ]
    }

    /// Names and `(old, new)` values of settings that differ.
    pub fn changes(&self, other: &PpoSettings) -> Vec<(&'static str, String, String)> {
        self.entries()
            .into_iter()
            .zip(other.entries())
            .filter(|((_, old), (_, new))| old != new)
            .map(|((name, old), (_, new))| (name, old, new))
            .collect()
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Why [`PpoAgent::learn`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The timestep budget was used up.
    Completed,
    /// A callback asked to stop.
    Callback,
    /// The interrupt flag was raised.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnOutcome {
    /// Environment steps collected by this call.
    pub timesteps: u64,
    pub stop: StopReason,
}

// ============================================================================
// Policy handle
// ============================================================================

/// What training callbacks can do with the agent.
pub trait Policy {
    /// One action per observation in the flat batch `obs`.
    fn predict(&self, obs: &[f32], deterministic: bool) -> Result<Vec<Action>>;

    /// Save the current weights to `path`.
    fn save(&self, path: &Path) -> Result<()>;

    fn num_timesteps(&self) -> u64;
}

// ============================================================================
// Agent
// ============================================================================

/// Actor-critic trained with PPO.
pub struct PpoAgent<B: AutodiffBackend> {
    model: PolicyNet<B>,
    architecture: PolicyArchitecture,
    shape: NetworkShape,
    settings: PpoSettings,
    device: B::Device,
    num_timesteps: u64,
    logger: MultiLogger,
}

impl<B: AutodiffBackend> PpoAgent<B> {
    /// Fresh agent for the observation and action spaces of `env`.
    pub fn new(
        architecture: PolicyArchitecture,
        settings: PpoSettings,
        env: &dyn VecEnv,
        device: B::Device,
    ) -> Result<Self> {
        settings.validate()?;
        let shape = NetworkShape::new(env.obs_size(), env.scan_size(), env.action_space());
        let model = PolicyNet::new(&architecture, &shape, &device)?;
        log::info!("Created policy {}", architecture);
        Ok(Self {
            model,
            architecture,
            shape,
            settings,
            device,
            num_timesteps: 0,
            logger: MultiLogger::new(),
        })
    }

    /// Agent saved by [`PpoAgent::save`], checked against `env`.
    pub fn load(path: &Path, env: &dyn VecEnv, device: B::Device) -> Result<Self> {
        let (model, meta) = load_policy::<B>(path, &device)?;
        let expected = NetworkShape::new(env.obs_size(), env.scan_size(), env.action_space());
        if meta.shape != expected {
            return Err(Error::invalid(
                "load",
                format!(
                    "'{}' was trained for {:?}, the environment provides {:?}",
                    path.display(),
                    meta.shape,
                    expected
                ),
            ));
        }
        log::info!(
            "Loaded policy {} from '{}' ({} timesteps trained)",
            meta.architecture,
            path.display(),
            meta.num_timesteps
        );
        Ok(Self {
            model,
            architecture: meta.architecture,
            shape: meta.shape,
            settings: meta.settings,
            device,
            num_timesteps: meta.num_timesteps,
            logger: MultiLogger::new(),
        })
    }

    /// Report training progress to `logger`.
    pub fn with_logger(mut self, logger: MultiLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn settings(&self) -> &PpoSettings {
        &self.settings
    }

    pub fn architecture(&self) -> &PolicyArchitecture {
        &self.architecture
    }

    /// Apply the hyperparameters of this run to a loaded agent.
    pub fn update_settings(&mut self, settings: PpoSettings) -> Result<()> {
        settings.validate()?;
        for (name, old, new) in self.settings.changes(&settings) {
            log::info!("Updated model hyperparameter '{}': {} -> {}", name, old, new);
        }
        self.settings = settings;
        Ok(())
    }

    fn meta(&self) -> CheckpointMeta {
        CheckpointMeta {
            architecture: self.architecture.clone(),
            shape: self.shape.clone(),
            settings: self.settings.clone(),
            num_timesteps: self.num_timesteps,
        }
    }

    fn obs_tensor(&self, obs: &[f32]) -> Tensor<B::InnerBackend, 2> {
        let n = obs.len() / self.shape.obs_size;
        Tensor::<B::InnerBackend, 1>::from_floats(obs, &self.device)
            .reshape([n, self.shape.obs_size])
    }

    fn sample(
        &self,
        model: &PolicyNet<B::InnerBackend>,
        obs: &[f32],
        deterministic: bool,
    ) -> Result<(SampledActions, Vec<f32>)> {
        let output = model.forward(self.obs_tensor(obs));
        let sampled = ActionDistribution::from_output(&output).sample(deterministic)?;
        Ok((sampled, to_vec(output.values)?))
    }

    /// Train for at least `total_timesteps` environment steps.
    ///
    /// Rollouts of `n_steps` vector steps are collected until the budget is
    /// reached, so the last rollout may overshoot. Callbacks run after every
    /// vector step; a callback returning `false` stops training right away,
    /// as does `interrupt`.
    pub fn learn(
        &mut self,
        env: &mut dyn VecEnv,
        total_timesteps: u64,
        callbacks: &mut [&mut dyn TrainingCallback],
        interrupt: &AtomicBool,
    ) -> Result<LearnOutcome> {
        let n_envs = env.n_envs();
        let obs_size = self.shape.obs_size;
        let gamma = self.settings.gamma as f32;
        let action_dim = if self.shape.discrete {
            1
        } else {
            self.shape.n_outputs
        };

        let mut optimizer = AdamConfig::new()
            .with_epsilon(1e-5)
            .with_grad_clipping(Some(GradientClippingConfig::Norm(
                self.settings.max_grad_norm as f32,
            )))
            .init::<B, PolicyNet<B>>();
        let mut buffer = RolloutBuffer::new(self.settings.n_steps, n_envs, obs_size, action_dim);

        let mut timesteps = 0u64;
        let mut iteration = 0usize;
        let mut episodes = 0usize;
        let mut ep_rewards = vec![0.0f32; n_envs];
        let mut ep_lengths = vec![0usize; n_envs];
        let mut recent: VecDeque<(f32, usize)> = VecDeque::with_capacity(EPISODE_WINDOW);

        self.num_timesteps = 0;
        let mut obs = env.reset()?;
        {
            let ctx = CallbackContext {
                policy: &*self,
                train_env: &*env,
                num_timesteps: 0,
            };
            for callback in callbacks.iter_mut() {
                callback.on_training_start(&ctx)?;
            }
        }

        while timesteps < total_timesteps {
            buffer.clear();
            let model = self.model.valid();

            while !buffer.is_full() {
                if interrupt.load(Ordering::Relaxed) {
                    log::warn!("Training interrupted after {} timesteps", timesteps);
                    return self.finish(timesteps, StopReason::Interrupted);
                }

                let (sampled, values) = self.sample(&model, &obs, false)?;
                let step = env.step(&sampled.actions)?;
                timesteps += n_envs as u64;
                self.num_timesteps = timesteps;

                let mut rewards = step.rewards.clone();
                let mut dones = Vec::with_capacity(n_envs);
                for i in 0..n_envs {
                    ep_rewards[i] += step.rewards[i];
                    ep_lengths[i] += 1;
                    if step.done(i) {
                        if recent.len() == EPISODE_WINDOW {
                            recent.pop_front();
                        }
                        recent.push_back((ep_rewards[i], ep_lengths[i]));
                        ep_rewards[i] = 0.0;
                        ep_lengths[i] = 0;
                        episodes += 1;
                    }
                    // bootstrap episodes cut by the step limit
                    if step.truncations[i] && !step.terminals[i] {
                        if let Some(final_obs) = &step.final_obs[i] {
                            let value = to_vec(model.values(self.obs_tensor(final_obs)))?;
                            rewards[i] += gamma * value.first().copied().unwrap_or(0.0);
                        }
                    }
                    dones.push(step.done(i));
                }

                buffer.push(
                    &obs,
                    &sampled.raw,
                    &rewards,
                    &dones,
                    &values,
                    &sampled.log_probs,
                );
                obs = step.obs;

                let ctx = CallbackContext {
                    policy: &*self,
                    train_env: &*env,
                    num_timesteps: timesteps,
                };
                for callback in callbacks.iter_mut() {
                    if !callback.on_step(&ctx)? {
                        log::info!("Training stopped by callback after {} timesteps", timesteps);
                        return self.finish(timesteps, StopReason::Callback);
                    }
                }
            }

            let last_values = to_vec(model.values(self.obs_tensor(&obs)))?;
            buffer.finish(&last_values, gamma, self.settings.gae_lambda as f32);

            let losses = self.train(&mut optimizer, &buffer)?;
            iteration += 1;

            let (rew_mean, len_mean) = if recent.is_empty() {
                (f32::NAN, f32::NAN)
            } else {
                let n = recent.len() as f32;
                (
                    recent.iter().map(|(r, _)| r).sum::<f32>() / n,
                    recent.iter().map(|(_, l)| *l as f32).sum::<f32>() / n,
                )
            };
            let snapshot = TrainingSnapshot::new(iteration, timesteps, episodes)
                .with_episode_stats(rew_mean, len_mean)
                .with_losses(losses.policy_loss, losses.value_loss, losses.entropy)
                .with_explained_variance(explained_variance(buffer.values(), buffer.returns()))
                .with_learning_rate(self.settings.learning_rate);
            self.logger.log(&snapshot);
            log::debug!(
                "Iteration {}: {} timesteps, policy loss {:.4}, value loss {:.4}",
                iteration,
                timesteps,
                losses.policy_loss,
                losses.value_loss
            );
        }

        self.finish(timesteps, StopReason::Completed)
    }

    fn finish(&mut self, timesteps: u64, stop: StopReason) -> Result<LearnOutcome> {
        self.logger.flush();
        Ok(LearnOutcome { timesteps, stop })
    }

    /// `n_epochs` passes of minibatch updates over one rollout.
    fn train<O: Optimizer<PolicyNet<B>, B>>(
        &mut self,
        optimizer: &mut O,
        buffer: &RolloutBuffer,
    ) -> Result<LossComponents> {
        let settings = self.settings.clone();
        let mut total = LossComponents::default();
        let mut updates = 0usize;

        for _epoch in 0..settings.n_epochs {
            for indices in buffer.minibatches(settings.batch_size) {
                let batch = buffer.minibatch::<B>(&indices, &self.device);
                let output = self.model.forward(batch.obs);
                let dist = ActionDistribution::from_output(&output);

                let (loss, parts) = ppo_loss(
                    dist.log_prob(batch.actions),
                    batch.old_log_probs,
                    batch.advantages,
                    output.values,
                    batch.returns,
                    dist.entropy(),
                    settings.clip_range as f32,
                    settings.vf_coef as f32,
                    settings.ent_coef as f32,
                )?;

                let grads = loss.backward();
                let grads = GradientsParams::from_grads(grads, &self.model);
                self.model = optimizer.step(settings.learning_rate, self.model.clone(), grads);

                total.policy_loss += parts.policy_loss;
                total.value_loss += parts.value_loss;
                total.entropy += parts.entropy;
                updates += 1;
            }
        }

        let n = updates.max(1) as f32;
        Ok(LossComponents {
            policy_loss: total.policy_loss / n,
            value_loss: total.value_loss / n,
            entropy: total.entropy / n,
        })
    }
}

impl<B: AutodiffBackend> Policy for PpoAgent<B> {
    fn predict(&self, obs: &[f32], deterministic: bool) -> Result<Vec<Action>> {
        let (sampled, _) = self.sample(&self.model.valid(), obs, deterministic)?;
        Ok(sampled.actions)
    }

    fn save(&self, path: &Path) -> Result<()> {
        save_policy(&self.model, &self.meta(), path)
    }

    fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }
}
