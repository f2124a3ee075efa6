//! Environment construction for training and evaluation.

use std::path::PathBuf;

use super::arena::{ArenaEnv, ArenaEnvConfig};
use super::monitor::Monitor;
use super::settings::{ActionSettings, RobotModel};
use super::{ActionSpace, NavEnv};
use crate::curriculum::Curriculum;
use crate::error::Result;
use crate::hyperparams::Hyperparameters;
use crate::paths::AgentPaths;
use crate::ros::{eval_namespace, train_namespace};

/// Deferred environment constructor, run on the thread that owns the env.
pub type EnvFactory = Box<dyn FnOnce() -> Result<Box<dyn NavEnv>> + Send>;

/// Everything an environment needs, loaded once per run.
#[derive(Debug, Clone)]
pub struct EnvContext {
    pub params: Hyperparameters,
    pub robot: RobotModel,
    pub action_space: ActionSpace,
    pub curriculum: Curriculum,
    /// Directory for evaluation monitor logs.
    pub eval_log: Option<PathBuf>,
}

impl EnvContext {
    /// Load robot model, action space and curriculum from the agent layout.
    ///
    /// The curriculum starts at `params.curr_stage` and writes stage changes
    /// back to the agent's hyperparameter record.
    pub fn load(params: &Hyperparameters, paths: &AgentPaths) -> Result<Self> {
        let robot = RobotModel::load(&paths.robot_setting)?;
        let action_space =
            ActionSettings::load(&paths.robot_as)?.action_space(params.discrete_action_space)?;
        let curriculum = Curriculum::load(&paths.curriculum, params.curr_stage)?
            .with_record(paths.hyperparameters_file());
        Ok(Self {
            params: params.clone(),
            robot,
            action_space,
            curriculum,
            eval_log: paths.eval.clone(),
        })
    }
}

/// Constructor for environment `rank`.
///
/// Training envs run in `sim_{rank+1}`, the evaluation env in `eval_sim`
/// (the root namespace without namespaces) wrapped in a [`Monitor`]. Every
/// env is seeded with `seed + rank`.
pub fn make_env(
    with_ns: bool,
    rank: usize,
    ctx: &EnvContext,
    train: bool,
    seed: u64,
) -> EnvFactory {
    let ctx = ctx.clone();
    Box::new(move || {
        let params = &ctx.params;
        let (namespace, max_steps) = if train {
            (
                train_namespace(with_ns, rank),
                params.train_max_steps_per_episode,
            )
        } else {
            (eval_namespace(with_ns), params.eval_max_steps_per_episode)
        };

        let config = ArenaEnvConfig::new(namespace, ctx.robot, ctx.action_space.clone())
            .with_reward_rule(params.reward_fnc)
            .with_goal_radius(params.goal_radius as f32)
            .with_max_steps(max_steps)
            .with_task_mode(params.task_mode)
            .with_train_mode(train);
        let env = ArenaEnv::new(config, ctx.curriculum.clone())?;

        let mut env: Box<dyn NavEnv> = if train {
            Box::new(env)
        } else {
            Box::new(Monitor::new(env, ctx.eval_log.as_deref())?)
        };
        env.seed(seed + rank as u64);
        Ok(env)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::StageSpec;
    use crate::env::settings::LaserSettings;
    use crate::env::{Action, MONITOR_FILE};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn ctx(eval_log: Option<PathBuf>) -> EnvContext {
        let mut stages = BTreeMap::new();
        stages.insert(
            1,
            StageSpec {
                static_obstacles: 2,
                dynamic_obstacles: 0,
            },
        );
        EnvContext {
            params: Hyperparameters::default(),
            robot: RobotModel {
                laser: LaserSettings {
                    num_beams: 18,
                    angle_min: -1.57,
                    angle_max: 1.57,
                    angle_increment: 3.14 / 17.0,
                    range: 5.0,
                },
                radius: 0.3,
            },
            action_space: ActionSpace::Continuous {
                low: vec![0.0, -1.0],
                high: vec![0.3, 1.0],
            },
            curriculum: Curriculum::from_stages(stages, 1).unwrap(),
            eval_log,
        }
    }

    #[test]
    fn test_train_env_namespaces() {
        let ctx = ctx(None);
        let env = make_env(true, 2, &ctx, true, 0)().unwrap();
        assert_eq!(env.namespace(), "sim_3");
        assert_eq!(env.obs_size(), 20);

        let env = make_env(false, 0, &ctx, true, 0)().unwrap();
        assert_eq!(env.namespace(), "");
    }

    #[test]
    fn test_eval_env_is_monitored() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx(Some(dir.path().to_path_buf()));
        let mut env = make_env(true, 0, &ctx, false, 0)().unwrap();
        assert_eq!(env.namespace(), "eval_sim");
        assert!(dir.path().join(MONITOR_FILE).is_file());

        env.reset().unwrap();
        let step = env.step(&Action::Continuous(vec![0.0, 0.0])).unwrap();
        assert_eq!(step.obs.len(), 20);
    }

    #[test]
    fn test_seed_offsets_by_rank() {
        let ctx = ctx(None);
        let mut a = make_env(true, 1, &ctx, true, 10)().unwrap();
        let mut b = make_env(true, 0, &ctx, true, 11)().unwrap();
        assert_eq!(a.reset().unwrap(), b.reset().unwrap());
    }
}
