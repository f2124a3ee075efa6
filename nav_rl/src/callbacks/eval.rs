//! Periodic evaluation with best-model tracking.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{CallbackContext, EvalHook, EvalState, TrainingCallback};
use crate::env::VecEnv;
use crate::error::{Error, Result};
use crate::paths::{BEST_MODEL, MODEL_EXTENSION, NORMALIZATION_FILE};
use crate::ppo::Policy;

/// File name of the evaluation log inside `log_path`.
pub const EVALUATIONS_FILE: &str = "evaluations.csv";

const EVALUATIONS_HEADER: &str = "timesteps,mean_reward,std_reward,mean_ep_length,success_rate";

/// Evaluation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    pub n_eval_episodes: usize,
    /// Evaluate every this many vector steps.
    pub eval_freq: u64,
    pub deterministic: bool,
    /// Directory for the evaluation log.
    pub log_path: Option<PathBuf>,
    /// Directory receiving the best model and its normalization statistics.
    pub best_model_save_path: Option<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            n_eval_episodes: 40,
            eval_freq: 20_000,
            deterministic: true,
            log_path: None,
            best_model_save_path: None,
        }
    }
}

impl EvalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_eval_episodes(mut self, n: usize) -> Self {
        self.n_eval_episodes = n;
        self
    }

    pub fn with_eval_freq(mut self, freq: u64) -> Self {
        self.eval_freq = freq;
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_best_model_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.best_model_save_path = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_eval_episodes == 0 {
            return Err(Error::invalid(
                "n_eval_episodes",
                "at least one evaluation episode is required",
            ));
        }
        if self.eval_freq == 0 {
            return Err(Error::invalid("eval_freq", "must be positive"));
        }
        Ok(())
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    pub num_timesteps: u64,
    pub mean_reward: f64,
    pub std_reward: f64,
    pub mean_ep_length: f64,
    /// `None` when no episode reported success information.
    pub success_rate: Option<f64>,
    pub episode_rewards: Vec<f64>,
    pub episode_lengths: Vec<usize>,
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Run `n_eval_episodes` episodes spread evenly over the environments.
///
/// Environment `i` contributes `(n_eval_episodes + i) / n_envs` episodes so
/// that faster environments do not bias the result. Episode returns come
/// from the monitor record when the environment provides one.
pub fn evaluate_policy(
    policy: &dyn Policy,
    env: &mut dyn VecEnv,
    n_eval_episodes: usize,
    deterministic: bool,
) -> Result<EvalResult> {
    let n_envs = env.n_envs();
    if n_envs == 0 {
        return Err(Error::Env("cannot evaluate without environments".into()));
    }
    let targets: Vec<usize> = (0..n_envs).map(|i| (n_eval_episodes + i) / n_envs).collect();
    let mut counts = vec![0usize; n_envs];
    let mut current_rewards = vec![0.0f64; n_envs];
    let mut current_lengths = vec![0usize; n_envs];

    let mut episode_rewards = Vec::with_capacity(n_eval_episodes);
    let mut episode_lengths = Vec::with_capacity(n_eval_episodes);
    let mut successes = Vec::new();

    let mut obs = env.reset()?;
    while counts.iter().zip(&targets).any(|(c, t)| c < t) {
        let actions = policy.predict(&obs, deterministic)?;
        let step = env.step(&actions)?;
        for i in 0..n_envs {
            if counts[i] >= targets[i] {
                continue;
            }
            current_rewards[i] += step.rewards[i] as f64;
            current_lengths[i] += 1;
            if !step.done(i) {
                continue;
            }
            let info = &step.infos[i];
            match &info.episode {
                Some(record) => {
                    episode_rewards.push(record.reward);
                    episode_lengths.push(record.length);
                }
                None => {
                    episode_rewards.push(current_rewards[i]);
                    episode_lengths.push(current_lengths[i]);
                }
            }
            if let Some(success) = info.is_success {
                successes.push(success);
            }
            counts[i] += 1;
            current_rewards[i] = 0.0;
            current_lengths[i] = 0;
        }
        obs = step.obs;
    }

    let (mean_reward, std_reward) = mean_std(&episode_rewards);
    let lengths: Vec<f64> = episode_lengths.iter().map(|&l| l as f64).collect();
    let (mean_ep_length, _) = mean_std(&lengths);
    let success_rate = (!successes.is_empty()).then(|| {
        successes.iter().filter(|&&s| s).count() as f64 / successes.len() as f64
    });

    Ok(EvalResult {
        num_timesteps: policy.num_timesteps(),
        mean_reward,
        std_reward,
        mean_ep_length,
        success_rate,
        episode_rewards,
        episode_lengths,
    })
}

/// Evaluates the policy every `eval_freq` vector steps on a separate
/// environment batch.
///
/// Observation statistics of the training batch are copied into the
/// evaluation batch before each evaluation. A new best mean reward saves
/// the policy and the training normalization statistics to
/// `best_model_save_path`.
pub struct EvalCallback {
    eval_env: Box<dyn VecEnv>,
    config: EvalConfig,
    state: EvalState,
    n_calls: u64,
    results: Vec<EvalResult>,
    on_new_best: Option<Box<dyn EvalHook>>,
    on_eval_end: Option<Box<dyn EvalHook>>,
}

impl EvalCallback {
    pub fn new(mut eval_env: Box<dyn VecEnv>, config: EvalConfig) -> Result<Self> {
        config.validate()?;
        eval_env.set_training(false);
        Ok(Self {
            eval_env,
            state: EvalState::new(config.n_eval_episodes),
            config,
            n_calls: 0,
            results: Vec::new(),
            on_new_best: None,
            on_eval_end: None,
        })
    }

    /// Run `hook` whenever the best mean reward improves.
    pub fn with_on_new_best(mut self, hook: Box<dyn EvalHook>) -> Self {
        self.on_new_best = Some(hook);
        self
    }

    /// Run `hook` after every evaluation.
    pub fn with_on_eval_end(mut self, hook: Box<dyn EvalHook>) -> Self {
        self.on_eval_end = Some(hook);
        self
    }

    pub fn state(&self) -> &EvalState {
        &self.state
    }

    pub fn results(&self) -> &[EvalResult] {
        &self.results
    }

    pub fn close(&mut self) -> Result<()> {
        self.eval_env.close()
    }

    fn best_model_path(dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", BEST_MODEL, MODEL_EXTENSION))
    }

    fn append_log(&self, result: &EvalResult) -> Result<()> {
        let Some(dir) = &self.config.log_path else {
            return Ok(());
        };
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let path = dir.join(EVALUATIONS_FILE);
        let new_file = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        let success = result
            .success_rate
            .map(|s| s.to_string())
            .unwrap_or_default();
        let mut write = || -> std::io::Result<()> {
            if new_file {
                writeln!(file, "{}", EVALUATIONS_HEADER)?;
            }
            writeln!(
                file,
                "{},{},{},{},{}",
                result.num_timesteps,
                result.mean_reward,
                result.std_reward,
                result.mean_ep_length,
                success
            )
        };
        write().map_err(|e| Error::io(&path, e))
    }

    fn evaluate(&mut self, ctx: &CallbackContext<'_>) -> Result<bool> {
        if let Some(stats) = ctx.train_env.normalization() {
            self.eval_env.set_normalization(&stats);
        }

        let mut result = evaluate_policy(
            ctx.policy,
            self.eval_env.as_mut(),
            self.config.n_eval_episodes,
            self.config.deterministic,
        )?;
        result.num_timesteps = ctx.num_timesteps;

        self.state.num_timesteps = ctx.num_timesteps;
        self.state.last_mean_reward = result.mean_reward;
        if let Some(rate) = result.success_rate {
            self.state.last_success_rate = rate;
        }

        log::info!(
            "Eval num_timesteps={}, episode_reward={:.2} +/- {:.2}",
            ctx.num_timesteps,
            result.mean_reward,
            result.std_reward
        );
        log::info!("Episode length: {:.2}", result.mean_ep_length);
        if let Some(rate) = result.success_rate {
            log::info!("Success rate: {:.2}%", 100.0 * rate);
        }
        self.append_log(&result)?;

        let mut continue_training = true;
        if result.mean_reward > self.state.best_mean_reward {
            log::info!("New best mean reward!");
            if let Some(dir) = &self.config.best_model_save_path {
                ctx.policy.save(&Self::best_model_path(dir))?;
                ctx.train_env
                    .save_normalization(&dir.join(NORMALIZATION_FILE))?;
            }
            self.state.best_mean_reward = result.mean_reward;
            if let Some(hook) = self.on_new_best.as_mut() {
                continue_training &= hook.on_eval(&mut self.state)?;
            }
        }
        if let Some(hook) = self.on_eval_end.as_mut() {
            continue_training &= hook.on_eval(&mut self.state)?;
        }

        self.results.push(result);
        Ok(continue_training)
    }
}

impl TrainingCallback for EvalCallback {
    fn on_step(&mut self, ctx: &CallbackContext<'_>) -> Result<bool> {
        self.n_calls += 1;
        if self.n_calls % self.config.eval_freq != 0 {
            return Ok(true);
        }
        self.evaluate(ctx)
    }
}
