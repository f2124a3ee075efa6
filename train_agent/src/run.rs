//! One training run from parsed arguments to shutdown.

use anyhow::{anyhow, Context, Result};
use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use nav_rl::agents::{agent_name, architecture_for, AgentSelection};
use nav_rl::callbacks::{
    EvalCallback, EvalConfig, InitiateNewTrainStage, StopTrainingOnRewardThreshold, ThresholdType,
    TrainingCallback,
};
use nav_rl::env::{
    build_vec_env, make_env, EnvContext, VecEnv, VecNormalize, VecNormalizeConfig,
};
use nav_rl::hyperparams::{initialize_hyperparameters, update_total_timesteps, Hyperparameters};
use nav_rl::metrics::{CSVLogger, ConsoleLogger, MultiLogger};
use nav_rl::paths::{AgentPaths, RunMode};
use nav_rl::ppo::{LearnOutcome, Policy, PpoAgent, PpoSettings};
use nav_rl::ros::{check_env_count, wait_for_nodes, NodeWaitConfig, RosMaster, SimulationLayout};

use crate::cli::Args;

const EVAL_EPISODES: usize = 40;
const EVAL_FREQ: u64 = 20_000;
const STAGE_UPPER_THRESHOLD: f64 = 0.85;
const STAGE_LOWER_THRESHOLD: f64 = 0.6;
const STOP_THRESHOLD: f64 = 0.9;

/// Poll the node registry, or fall back to the built-in simulation.
fn connect_simulation(args: &Args) -> Result<SimulationLayout> {
    let Some(uri) = &args.ros_master_uri else {
        log::info!("No ROS master configured, using the built-in simulation");
        check_env_count(true, args.n_envs)?;
        return Ok(SimulationLayout::Namespaced);
    };
    let master = RosMaster::new(uri.as_str());
    let layout = SimulationLayout::detect(&master)
        .with_context(|| format!("failed to query the ROS master at {}", uri))?;
    wait_for_nodes(&master, layout.with_ns(), args.n_envs, &NodeWaitConfig::default())?;
    Ok(layout)
}

/// Training batch and evaluation batch, normalized when the agent asks for it.
fn build_envs(
    args: &Args,
    params: &Hyperparameters,
    paths: &AgentPaths,
    ctx: &EnvContext,
    layout: SimulationLayout,
) -> Result<(Box<dyn VecEnv>, Box<dyn VecEnv>)> {
    let with_ns = layout.with_ns();
    let threaded = !args.debug && with_ns;
    let factories = (0..args.n_envs)
        .map(|rank| make_env(with_ns, rank, ctx, true, args.seed))
        .collect();
    let train_env = build_vec_env(factories, threaded)?;
    let eval_env = build_vec_env(vec![make_env(with_ns, 0, ctx, false, args.seed)], false)?;

    if !params.normalize {
        return Ok((train_env, eval_env));
    }
    let config = VecNormalizeConfig::new().with_gamma(params.gamma);
    let stats_file = paths.normalization_file();
    let train_env: Box<dyn VecEnv> = if stats_file.is_file() {
        log::info!("Loading normalization statistics from '{}'", stats_file.display());
        Box::new(VecNormalize::load(&stats_file, train_env)?)
    } else {
        Box::new(VecNormalize::new(train_env, config.clone()))
    };
    let eval_env: Box<dyn VecEnv> =
        Box::new(VecNormalize::new(eval_env, config.with_training(false)));
    Ok((train_env, eval_env))
}

fn build_eval_callback(
    params: &Hyperparameters,
    paths: &AgentPaths,
    ctx: &EnvContext,
    eval_env: Box<dyn VecEnv>,
) -> Result<EvalCallback> {
    let train_stage = InitiateNewTrainStage::new(
        ThresholdType::Succ,
        STAGE_UPPER_THRESHOLD,
        STAGE_LOWER_THRESHOLD,
        params.task_mode,
        ctx.curriculum.clone(),
    )?;
    let stop = StopTrainingOnRewardThreshold::new(ThresholdType::Succ, STOP_THRESHOLD);

    let mut config = EvalConfig::new()
        .with_n_eval_episodes(EVAL_EPISODES)
        .with_eval_freq(EVAL_FREQ)
        .with_deterministic(true)
        .with_best_model_save_path(&paths.model);
    if let Some(dir) = &paths.eval {
        config = config.with_log_path(dir);
    }

    Ok(EvalCallback::new(eval_env, config)?
        .with_on_eval_end(Box::new(train_stage))
        .with_on_new_best(Box::new(stop)))
}

fn build_agent<B: AutodiffBackend>(
    selection: &AgentSelection,
    params: &Hyperparameters,
    paths: &AgentPaths,
    env: &dyn VecEnv,
    device: B::Device,
) -> Result<PpoAgent<B>> {
    let settings = PpoSettings::from_hyperparameters(params);
    let agent = match architecture_for(selection)? {
        Some(architecture) => PpoAgent::new(architecture, settings, env, device)?,
        None => {
            let file = paths
                .resume_model_file()
                .ok_or_else(|| anyhow!("no model to resume in '{}'", paths.model.display()))?;
            let mut agent = PpoAgent::load(&file, env, device)?;
            agent.update_settings(settings)?;
            agent
        }
    };

    let mut logger = MultiLogger::new().add(ConsoleLogger::new());
    if let Some(tb) = &paths.tb {
        logger = logger.add(CSVLogger::in_dir(tb)?);
    }
    Ok(agent.with_logger(logger))
}

/// Train one agent; `interrupt` ends training early but still saves.
pub fn run<B: AutodiffBackend>(
    args: &Args,
    device: B::Device,
    interrupt: &AtomicBool,
) -> Result<LearnOutcome> {
    let start = Instant::now();
    for flag in args.unused_custom_flags() {
        log::warn!("{} is ignored without --custom-mlp", flag);
    }

    let selection = args.selection()?;
    let name = agent_name(&selection, &Local::now());
    let mode = if selection.is_new() {
        RunMode::Train
    } else {
        RunMode::Load
    };
    let paths = AgentPaths::resolve(&name, mode, args.log_toggles(), &args.roots())
        .with_context(|| format!("failed to prepare the directories of agent '{}'", name))?;
    let load_target = match &selection {
        AgentSelection::Load(target) => Some(target.as_str()),
        _ => None,
    };
    let params = initialize_hyperparameters(&paths, load_target, &args.config, args.n_envs)?;

    let layout = connect_simulation(args)?;
    let ctx = EnvContext::load(&params, &paths)?;
    let (mut train_env, eval_env) = build_envs(args, &params, &paths, &ctx, layout)?;
    let mut eval_callback = build_eval_callback(&params, &paths, &ctx, eval_env)?;
    let mut agent = build_agent::<B>(&selection, &params, &paths, train_env.as_ref(), device)?;

    let n_timesteps = args.n_timesteps();
    log::info!("Training '{}' for {} timesteps", name, n_timesteps);
    let outcome = {
        let mut callbacks: [&mut dyn TrainingCallback; 1] = [&mut eval_callback];
        agent.learn(train_env.as_mut(), n_timesteps, &mut callbacks, interrupt)
    };

    // bookkeeping runs even when training failed
    let trained = match &outcome {
        Ok(outcome) => outcome.timesteps,
        Err(_) => agent.num_timesteps(),
    };
    let total = update_total_timesteps(&paths, trained)?;
    log::info!("Agent '{}' has been trained for {} timesteps in total", name, total);

    let model_file = paths.model_file();
    agent.save(&model_file)?;
    if train_env.save_normalization(&paths.normalization_file())? {
        log::debug!("Saved normalization statistics");
    }
    log::info!("Saved model to '{}'", model_file.display());

    if let Err(e) = train_env.close() {
        log::warn!("Failed to close training environments: {}", e);
    }
    if let Err(e) = eval_callback.close() {
        log::warn!("Failed to close evaluation environment: {}", e);
    }
    log::info!("Time passed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(outcome?)
}

#[cfg(test)]
mod tests;
