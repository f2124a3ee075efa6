//! Agent hyperparameters.
//!
//! Presets live in `<pkg>/configs/hyperparameters/<name>.json`. When a new
//! agent is created the preset is copied into the agent directory as
//! `hyperparameters.json`; that copy is the one read back when resuming, and it
//! also carries the total number of timesteps the agent has been trained for.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::files::{read_json, write_json};
use crate::paths::AgentPaths;

/// How tasks are generated for the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Curriculum stages with increasing obstacle counts.
    Staged,
    /// Random goals with a fixed obstacle count.
    Random,
    /// Scripted scenarios.
    Scenario,
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskMode::Staged => "staged",
            TaskMode::Random => "random",
            TaskMode::Scenario => "scenario",
        })
    }
}

/// Reward rule evaluated by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardRule {
    #[serde(rename = "rule_00")]
    Rule00,
    #[serde(rename = "rule_01")]
    Rule01,
}

impl fmt::Display for RewardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RewardRule::Rule00 => "rule_00",
            RewardRule::Rule01 => "rule_01",
        })
    }
}

/// Hyperparameter record of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub agent_name: String,
    pub robot: String,
    /// Transitions collected per rollout over all environments.
    pub batch_size: usize,
    pub gamma: f64,
    /// Transitions collected per rollout and environment.
    pub n_steps: usize,
    pub ent_coef: f64,
    pub learning_rate: f64,
    pub vf_coef: f64,
    pub max_grad_norm: f64,
    pub gae_lambda: f64,
    /// Minibatch size of the gradient updates.
    pub m_batch_size: usize,
    pub n_epochs: usize,
    pub clip_range: f64,
    pub reward_fnc: RewardRule,
    pub discrete_action_space: bool,
    pub normalize: bool,
    pub task_mode: TaskMode,
    pub curr_stage: usize,
    pub train_max_steps_per_episode: usize,
    pub eval_max_steps_per_episode: usize,
    pub goal_radius: f64,
    /// Total timesteps trained so far.
    pub n_timesteps: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            agent_name: String::new(),
            robot: "myrobot".to_string(),
            batch_size: 2048,
            gamma: 0.99,
            n_steps: 2048,
            ent_coef: 0.005,
            learning_rate: 3e-4,
            vf_coef: 0.22,
            max_grad_norm: 0.5,
            gae_lambda: 0.95,
            m_batch_size: 16,
            n_epochs: 3,
            clip_range: 0.22,
            reward_fnc: RewardRule::Rule00,
            discrete_action_space: false,
            normalize: true,
            task_mode: TaskMode::Staged,
            curr_stage: 1,
            train_max_steps_per_episode: 500,
            eval_max_steps_per_episode: 500,
            goal_radius: 0.25,
            n_timesteps: 0,
        }
    }
}

impl Hyperparameters {
    /// `(key, value)` pairs sorted by key, for logging.
    pub fn entries(&self) -> Vec<(String, String)> {
        let value = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return Vec::new(),
        };
        value
            .into_iter()
            .map(|(key, v)| {
                let text = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, text)
            })
            .collect()
    }

    /// Log every value at info level.
    pub fn log(&self) {
        log::info!("--------------------------------");
        log::info!("         HYPERPARAMETERS        ");
        for (key, value) in self.entries() {
            log::info!("{:<30}{}", key, value);
        }
        log::info!("--------------------------------");
    }
}

/// Validate rollout and minibatch sizes against the environment count.
pub fn check_batch_size(n_envs: usize, batch_size: usize, m_batch_size: usize) -> Result<()> {
    if n_envs == 0 {
        return Err(Error::invalid("n_envs", "at least one environment is required"));
    }
    if m_batch_size == 0 || batch_size <= m_batch_size {
        return Err(Error::invalid(
            "batch_size",
            format!(
                "mini batch size {} must be positive and smaller than batch size {}",
                m_batch_size, batch_size
            ),
        ));
    }
    if batch_size % m_batch_size != 0 {
        return Err(Error::invalid(
            "batch_size",
            format!(
                "batch size {} isn't divisible by mini batch size {}",
                batch_size, m_batch_size
            ),
        ));
    }
    if batch_size % n_envs != 0 {
        return Err(Error::invalid(
            "batch_size",
            format!(
                "batch size {} isn't divisible by the number of environments {}",
                batch_size, n_envs
            ),
        ));
    }
    Ok(())
}

/// Load, validate and persist the hyperparameters of this run.
///
/// New agents start from the preset `config_name` and take the model directory
/// name as `agent_name`; resumed agents read their own record. `n_steps` is
/// always derived from `batch_size / n_envs`.
pub fn initialize_hyperparameters(
    paths: &AgentPaths,
    load_target: Option<&str>,
    config_name: &str,
    n_envs: usize,
) -> Result<Hyperparameters> {
    let mut params = match load_target {
        None => {
            let preset = paths.config_file(config_name);
            if !preset.is_file() {
                return Err(Error::NotFound {
                    what: format!("hyperparameter preset '{}.json'", config_name),
                    path: paths.hyperparams.clone(),
                });
            }
            let mut params: Hyperparameters = read_json(&preset)?;
            params.agent_name = paths
                .model
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| paths.agent_name.clone());
            params
        }
        Some(_) => load_agent_record(paths)?,
    };

    check_batch_size(n_envs, params.batch_size, params.m_batch_size)?;
    params.n_steps = params.batch_size / n_envs;

    write_json(&paths.hyperparameters_file(), &params)?;
    params.log();
    Ok(params)
}

/// Add `timesteps` to the agent's recorded total.
pub fn update_total_timesteps(paths: &AgentPaths, timesteps: u64) -> Result<u64> {
    let mut params = load_agent_record(paths)?;
    params.n_timesteps = params.n_timesteps.saturating_add(timesteps);
    write_json(&paths.hyperparameters_file(), &params)?;
    Ok(params.n_timesteps)
}

fn load_agent_record(paths: &AgentPaths) -> Result<Hyperparameters> {
    let file = paths.hyperparameters_file();
    if !file.is_file() {
        return Err(Error::NotFound {
            what: "'hyperparameters.json'".to_string(),
            path: paths.model.clone(),
        });
    }
    read_json(&file)
}
