//! Built-in kinematic navigation simulation.
//!
//! A differential-drive robot moves inside a square arena with circular
//! obstacles. Static obstacles stay put; dynamic obstacles drift at constant
//! speed and bounce off the walls. The obstacle counts come from the current
//! curriculum stage whenever an episode starts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

use super::reward::RewardCalculator;
use super::settings::RobotModel;
use super::{Action, ActionSpace, DoneReason, EnvStep, NavEnv, StepInfo};
use crate::curriculum::{Curriculum, StageSpec};
use crate::error::{Error, Result};
use crate::hyperparams::{RewardRule, TaskMode};

/// Placement attempts before accepting a crowded spawn.
const MAX_PLACEMENT_TRIES: usize = 200;
/// Minimum start-to-goal distance.
const MIN_GOAL_DISTANCE: f32 = 1.0;
/// Free space kept around spawned robot and goal.
const SPAWN_CLEARANCE: f32 = 0.2;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration of an [`ArenaEnv`].
#[derive(Debug, Clone)]
pub struct ArenaEnvConfig {
    pub namespace: String,
    pub robot: RobotModel,
    pub action_space: ActionSpace,
    pub reward_rule: RewardRule,
    pub goal_radius: f32,
    pub max_steps_per_episode: usize,
    pub task_mode: TaskMode,
    /// Evaluation environments run with `train_mode == false`.
    pub train_mode: bool,
    /// Side length of the square arena in meters.
    pub map_size: f32,
    /// Simulated seconds per step.
    pub step_size: f32,
}

impl ArenaEnvConfig {
    pub fn new(namespace: impl Into<String>, robot: RobotModel, action_space: ActionSpace) -> Self {
        Self {
            namespace: namespace.into(),
            robot,
            action_space,
            reward_rule: RewardRule::Rule00,
            goal_radius: 0.25,
            max_steps_per_episode: 500,
            task_mode: TaskMode::Staged,
            train_mode: true,
            map_size: 10.0,
            step_size: 0.1,
        }
    }

    pub fn with_reward_rule(mut self, rule: RewardRule) -> Self {
        self.reward_rule = rule;
        self
    }

    pub fn with_goal_radius(mut self, goal_radius: f32) -> Self {
        self.goal_radius = goal_radius;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps_per_episode = max_steps;
        self
    }

    pub fn with_task_mode(mut self, task_mode: TaskMode) -> Self {
        self.task_mode = task_mode;
        self
    }

    pub fn with_train_mode(mut self, train_mode: bool) -> Self {
        self.train_mode = train_mode;
        self
    }

    pub fn with_map_size(mut self, map_size: f32) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_step_size(mut self, step_size: f32) -> Self {
        self.step_size = step_size;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.task_mode == TaskMode::Scenario {
            return Err(Error::invalid(
                "task_mode",
                "scenario tasks need an external simulator",
            ));
        }
        if self.max_steps_per_episode == 0 {
            return Err(Error::invalid("max_steps_per_episode", "must be positive"));
        }
        if self.map_size <= 4.0 * self.robot.radius || self.step_size <= 0.0 {
            return Err(Error::invalid(
                "map_size",
                format!(
                    "arena of {} m with step {} s is too small for the robot",
                    self.map_size, self.step_size
                ),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// State
// ============================================================================

/// Robot pose in world coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RobotState {
    pub x: f32,
    pub y: f32,
    pub theta: f32,
}

#[derive(Debug, Clone, Copy)]
struct Obstacle {
    x: f32,
    y: f32,
    radius: f32,
    vx: f32,
    vy: f32,
}

fn wrap_angle(angle: f32) -> f32 {
    let mut a = (angle + PI) % (2.0 * PI);
    if a < 0.0 {
        a += 2.0 * PI;
    }
    a - PI
}

/// Built-in navigation environment.
pub struct ArenaEnv {
    config: ArenaEnvConfig,
    curriculum: Curriculum,
    /// Obstacle counts in random task mode, fixed at construction.
    fixed_spec: StageSpec,
    rng: StdRng,
    robot: RobotState,
    goal: (f32, f32),
    obstacles: Vec<Obstacle>,
    scan: Vec<f32>,
    reward: RewardCalculator,
    steps: usize,
}

impl ArenaEnv {
    pub fn new(config: ArenaEnvConfig, curriculum: Curriculum) -> Result<Self> {
        config.validate()?;
        let reward = RewardCalculator::new(
            config.reward_rule,
            config.robot.radius,
            config.goal_radius,
        );
        let fixed_spec = curriculum.current_spec();
        let scan = vec![config.robot.laser.range; config.robot.laser.num_beams];
        log::debug!(
            "[{}] arena env: {} beams, {} actions, train_mode={}",
            config.namespace,
            config.robot.laser.num_beams,
            config.action_space.n_outputs(),
            config.train_mode
        );
        Ok(Self {
            config,
            curriculum,
            fixed_spec,
            rng: StdRng::seed_from_u64(0),
            robot: RobotState::default(),
            goal: (0.0, 0.0),
            obstacles: Vec::new(),
            scan,
            reward,
            steps: 0,
        })
    }

    pub fn robot(&self) -> RobotState {
        self.robot
    }

    pub fn goal(&self) -> (f32, f32) {
        self.goal
    }

    pub fn n_obstacles(&self) -> usize {
        self.obstacles.len()
    }

    fn stage_spec(&self) -> StageSpec {
        match self.config.task_mode {
            TaskMode::Staged => self.curriculum.current_spec(),
            _ => self.fixed_spec,
        }
    }

    fn random_point(&mut self, margin: f32) -> (f32, f32) {
        let hi = self.config.map_size - margin;
        (
            self.rng.gen_range(margin..hi),
            self.rng.gen_range(margin..hi),
        )
    }

    fn is_free(&self, p: (f32, f32), clearance: f32) -> bool {
        self.obstacles.iter().all(|o| {
            let d = ((p.0 - o.x).powi(2) + (p.1 - o.y).powi(2)).sqrt();
            d > o.radius + clearance
        })
    }

    fn spawn_obstacles(&mut self, spec: StageSpec) {
        self.obstacles.clear();
        for _ in 0..spec.static_obstacles {
            let radius = self.rng.gen_range(0.2..0.5);
            let (x, y) = self.random_point(radius);
            self.obstacles.push(Obstacle {
                x,
                y,
                radius,
                vx: 0.0,
                vy: 0.0,
            });
        }
        for _ in 0..spec.dynamic_obstacles {
            let radius = 0.3;
            let (x, y) = self.random_point(radius);
            let speed = self.rng.gen_range(0.1..0.3);
            let heading = self.rng.gen_range(-PI..PI);
            self.obstacles.push(Obstacle {
                x,
                y,
                radius,
                vx: speed * heading.cos(),
                vy: speed * heading.sin(),
            });
        }
    }

    fn free_point(&mut self, avoid: Option<(f32, f32)>) -> (f32, f32) {
        let margin = self.config.robot.radius + SPAWN_CLEARANCE;
        let clearance = self.config.robot.radius + SPAWN_CLEARANCE;
        let mut point = self.random_point(margin);
        for _ in 0..MAX_PLACEMENT_TRIES {
            let far_enough = avoid.map_or(true, |a| {
                ((point.0 - a.0).powi(2) + (point.1 - a.1).powi(2)).sqrt() >= MIN_GOAL_DISTANCE
            });
            if far_enough && self.is_free(point, clearance) {
                break;
            }
            point = self.random_point(margin);
        }
        point
    }

    fn move_obstacles(&mut self) {
        let dt = self.config.step_size;
        let size = self.config.map_size;
        for o in &mut self.obstacles {
            o.x += o.vx * dt;
            o.y += o.vy * dt;
            if o.x < o.radius || o.x > size - o.radius {
                o.vx = -o.vx;
                o.x = o.x.clamp(o.radius, size - o.radius);
            }
            if o.y < o.radius || o.y > size - o.radius {
                o.vy = -o.vy;
                o.y = o.y.clamp(o.radius, size - o.radius);
            }
        }
    }

    /// Distance along a ray to the first wall or obstacle, capped at `range`.
    fn cast_ray(&self, angle: f32) -> f32 {
        let range = self.config.robot.laser.range;
        let size = self.config.map_size;
        let (px, py) = (self.robot.x, self.robot.y);
        let (dx, dy) = (angle.cos(), angle.sin());

        let mut dist = range;
        for (p, d) in [(px, dx), (py, dy)] {
            let t = if d > 1e-9 {
                (size - p) / d
            } else if d < -1e-9 {
                -p / d
            } else {
                f32::INFINITY
            };
            dist = dist.min(t.max(0.0));
        }

        for o in &self.obstacles {
            let (ox, oy) = (px - o.x, py - o.y);
            let b = dx * ox + dy * oy;
            let c = ox * ox + oy * oy - o.radius * o.radius;
            let disc = b * b - c;
            if disc < 0.0 {
                continue;
            }
            let sq = disc.sqrt();
            let t = if -b - sq >= 0.0 { -b - sq } else { -b + sq };
            if t >= 0.0 {
                dist = dist.min(t);
            }
        }
        dist
    }

    fn update_scan(&mut self) {
        let laser = self.config.robot.laser;
        for i in 0..laser.num_beams {
            let dist = self.cast_ray(self.robot.theta + laser.beam_angle(i));
            self.scan[i] = dist;
        }
    }

    /// Goal in polar robot coordinates `(rho, theta)`.
    fn goal_in_robot_frame(&self) -> (f32, f32) {
        let dx = self.goal.0 - self.robot.x;
        let dy = self.goal.1 - self.robot.y;
        let rho = (dx * dx + dy * dy).sqrt();
        let theta = wrap_angle(dy.atan2(dx) - self.robot.theta);
        (rho, theta)
    }

    fn observation(&self) -> Vec<f32> {
        let (rho, theta) = self.goal_in_robot_frame();
        let mut obs = Vec::with_capacity(self.scan.len() + 2);
        obs.extend_from_slice(&self.scan);
        obs.push(rho);
        obs.push(theta);
        obs
    }

    /// Whether the robot body overlaps a wall or an obstacle.
    fn in_collision(&self) -> bool {
        let r = self.config.robot.radius;
        let size = self.config.map_size;
        let (x, y) = (self.robot.x, self.robot.y);
        x < r || y < r || x > size - r || y > size - r || !self.is_free((x, y), r)
    }
}

impl NavEnv for ArenaEnv {
    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn obs_size(&self) -> usize {
        self.config.robot.laser.num_beams + 2
    }

    fn scan_size(&self) -> usize {
        self.config.robot.laser.num_beams
    }

    fn action_space(&self) -> &ActionSpace {
        &self.config.action_space
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        let spec = self.stage_spec();
        self.spawn_obstacles(spec);

        let (x, y) = self.free_point(None);
        self.robot = RobotState {
            x,
            y,
            theta: self.rng.gen_range(-PI..PI),
        };
        self.goal = self.free_point(Some((x, y)));

        self.steps = 0;
        self.reward.reset();
        self.update_scan();
        Ok(self.observation())
    }

    fn step(&mut self, action: &Action) -> Result<EnvStep> {
        match (action, &self.config.action_space) {
            (Action::Discrete(i), ActionSpace::Discrete(actions)) if *i < actions.len() => {}
            (Action::Continuous(v), ActionSpace::Continuous { low, .. }) if v.len() == low.len() => {}
            _ => {
                return Err(Error::Env(format!(
                    "[{}] action {:?} does not fit the action space",
                    self.config.namespace, action
                )))
            }
        }

        let (linear, angular) = self.config.action_space.velocity(action);
        let dt = self.config.step_size;
        self.robot.theta = wrap_angle(self.robot.theta + angular * dt);
        self.robot.x += linear * self.robot.theta.cos() * dt;
        self.robot.y += linear * self.robot.theta.sin() * dt;
        self.move_obstacles();
        self.steps += 1;
        self.update_scan();

        let (goal_dist, _) = self.goal_in_robot_frame();
        let mut min_scan = self.scan.iter().copied().fold(f32::INFINITY, f32::min);
        if self.in_collision() {
            min_scan = min_scan.min(0.0);
        }
        let outcome = self.reward.compute(goal_dist, min_scan, (linear, angular));

        let terminal = outcome.done_reason.is_some();
        let truncated = !terminal && self.steps >= self.config.max_steps_per_episode;
        let done_reason = if truncated {
            Some(DoneReason::Timeout)
        } else {
            outcome.done_reason
        };
        let info = StepInfo {
            done_reason,
            is_success: done_reason.map(|r| r == DoneReason::GoalReached),
            episode: None,
        };

        Ok(EnvStep {
            obs: self.observation(),
            reward: outcome.reward,
            terminal,
            truncated,
            info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::settings::LaserSettings;
    use crate::env::DiscreteAction;
    use std::collections::BTreeMap;

    fn robot() -> RobotModel {
        RobotModel {
            laser: LaserSettings {
                num_beams: 36,
                angle_min: -PI,
                angle_max: PI - 2.0 * PI / 36.0,
                angle_increment: 2.0 * PI / 36.0,
                range: 8.0,
            },
            radius: 0.3,
        }
    }

    fn discrete() -> ActionSpace {
        ActionSpace::Discrete(vec![
            DiscreteAction {
                name: "forward".into(),
                linear: 0.3,
                angular: 0.0,
            },
            DiscreteAction {
                name: "stop".into(),
                linear: 0.0,
                angular: 0.0,
            },
        ])
    }

    fn curriculum(static_obstacles: usize) -> Curriculum {
        let mut stages = BTreeMap::new();
        stages.insert(
            1,
            StageSpec {
                static_obstacles: 0,
                dynamic_obstacles: 0,
            },
        );
        stages.insert(
            2,
            StageSpec {
                static_obstacles,
                dynamic_obstacles: 2,
            },
        );
        Curriculum::from_stages(stages, 1).unwrap()
    }

    fn env(config: ArenaEnvConfig, curriculum: Curriculum) -> ArenaEnv {
        let mut env = ArenaEnv::new(config, curriculum).unwrap();
        env.seed(7);
        env
    }

    #[test]
    fn test_observation_layout() {
        let mut env = env(ArenaEnvConfig::new("sim_1", robot(), discrete()), curriculum(3));
        let obs = env.reset().unwrap();
        assert_eq!(obs.len(), env.obs_size());
        assert_eq!(env.scan_size(), 36);
        assert!(obs[..36].iter().all(|&d| (0.0..=8.0).contains(&d)));
        assert!(obs[36] >= MIN_GOAL_DISTANCE);
        assert!(obs[37].abs() <= PI);
    }

    #[test]
    fn test_seeded_resets_repeat() {
        let config = ArenaEnvConfig::new("sim_1", robot(), discrete());
        let mut a = env(config.clone(), curriculum(3));
        let mut b = env(config, curriculum(3));
        assert_eq!(a.reset().unwrap(), b.reset().unwrap());
        assert_eq!(a.robot(), b.robot());
    }

    #[test]
    fn test_staged_obstacles_follow_curriculum() {
        let shared = curriculum(4);
        let mut env = env(ArenaEnvConfig::new("sim_1", robot(), discrete()), shared.clone());
        env.reset().unwrap();
        assert_eq!(env.n_obstacles(), 0);

        shared.next_stage().unwrap();
        env.reset().unwrap();
        assert_eq!(env.n_obstacles(), 6);
    }

    #[test]
    fn test_random_mode_keeps_start_stage() {
        let shared = curriculum(4);
        let config =
            ArenaEnvConfig::new("sim_1", robot(), discrete()).with_task_mode(TaskMode::Random);
        let mut env = env(config, shared.clone());
        shared.next_stage().unwrap();
        env.reset().unwrap();
        assert_eq!(env.n_obstacles(), 0);
    }

    #[test]
    fn test_timeout_truncates() {
        let config = ArenaEnvConfig::new("sim_1", robot(), discrete()).with_max_steps(3);
        let mut env = env(config, curriculum(0));
        env.reset().unwrap();
        let mut last = None;
        for _ in 0..3 {
            let step = env.step(&Action::Discrete(1)).unwrap();
            last = Some(step);
        }
        let step = last.unwrap();
        assert!(step.truncated);
        assert!(!step.terminal);
        assert_eq!(step.info.done_reason, Some(DoneReason::Timeout));
        assert_eq!(step.info.is_success, Some(false));
    }

    #[test]
    fn test_driving_into_wall_collides() {
        let config = ArenaEnvConfig::new("sim_1", robot(), discrete()).with_max_steps(10_000);
        let mut env = env(config, curriculum(0));
        env.reset().unwrap();
        // Remove the goal from the robot's path.
        env.goal = (-100.0, -100.0);
        let mut reason = None;
        for _ in 0..5_000 {
            let step = env.step(&Action::Discrete(0)).unwrap();
            if step.done() {
                reason = step.info.done_reason;
                break;
            }
        }
        assert_eq!(reason, Some(DoneReason::Collision));
    }

    #[test]
    fn test_rejects_mismatched_action() {
        let mut env = env(ArenaEnvConfig::new("sim_1", robot(), discrete()), curriculum(0));
        env.reset().unwrap();
        assert!(env.step(&Action::Discrete(5)).is_err());
        assert!(env.step(&Action::Continuous(vec![0.1, 0.0])).is_err());
    }

    #[test]
    fn test_scenario_mode_is_rejected() {
        let config =
            ArenaEnvConfig::new("sim_1", robot(), discrete()).with_task_mode(TaskMode::Scenario);
        assert!(ArenaEnv::new(config, curriculum(0)).is_err());
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-5 || (wrap_angle(3.0 * PI) + PI).abs() < 1e-5);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-6);
        assert!((wrap_angle(-0.5 - 2.0 * PI) + 0.5).abs() < 1e-5);
    }
}
