//! Navigation environments and vectorized wrappers.
//!
//! # Layout
//!
//! - [`NavEnv`]: a single simulation, addressed by its namespace
//! - [`ArenaEnv`]: built-in kinematic 2-D simulation
//! - [`Monitor`]: episode statistics wrapper
//! - [`VecEnv`]: a batch of environments with auto-reset
//!   ([`SequentialVecEnv`], [`ThreadedVecEnv`])
//! - [`VecNormalize`]: running observation normalization over a [`VecEnv`]
//!
//! Observations are flat `f32` vectors: the laser scan first, followed by
//! the goal in polar robot coordinates `[rho, theta]`.

mod arena;
mod factory;
mod monitor;
mod normalize;
mod reward;
mod settings;
mod vec_env;

pub use arena::{ArenaEnv, ArenaEnvConfig, RobotState};
pub use factory::{make_env, EnvContext, EnvFactory};
pub use monitor::{Monitor, MONITOR_FILE};
pub use normalize::{NormalizationStats, VecNormalize, VecNormalizeConfig};
pub use settings::{ActionSettings, DiscreteActionSetting, LaserSettings, RobotModel};
pub use vec_env::{build_vec_env, SequentialVecEnv, ThreadedVecEnv, VecEnv, VecStep};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

// ============================================================================
// Actions
// ============================================================================

/// A named velocity command of a discrete action space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteAction {
    pub name: String,
    pub linear: f32,
    pub angular: f32,
}

/// Action space of the robot.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionSpace {
    /// A fixed menu of velocity commands.
    Discrete(Vec<DiscreteAction>),
    /// Linear and angular velocity within `[low, high]` per dimension.
    Continuous { low: Vec<f32>, high: Vec<f32> },
}

impl ActionSpace {
    /// Number of policy outputs for this space (actions or dimensions).
    pub fn n_outputs(&self) -> usize {
        match self {
            ActionSpace::Discrete(actions) => actions.len(),
            ActionSpace::Continuous { low, .. } => low.len(),
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, ActionSpace::Discrete(_))
    }

    /// Velocity command `(linear, angular)` for an action.
    pub fn velocity(&self, action: &Action) -> (f32, f32) {
        match (self, action) {
            (ActionSpace::Discrete(actions), Action::Discrete(i)) => actions
                .get(*i)
                .map(|a| (a.linear, a.angular))
                .unwrap_or((0.0, 0.0)),
            (ActionSpace::Continuous { low, high }, Action::Continuous(values)) => {
                let clip = |i: usize| {
                    let v = values.get(i).copied().unwrap_or(0.0);
                    let lo = low.get(i).copied().unwrap_or(0.0);
                    let hi = high.get(i).copied().unwrap_or(0.0);
                    v.clamp(lo, hi)
                };
                (clip(0), clip(1))
            }
            _ => (0.0, 0.0),
        }
    }
}

/// An action sent to one environment.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Discrete(usize),
    Continuous(Vec<f32>),
}

// ============================================================================
// Step results
// ============================================================================

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoneReason {
    Timeout,
    Collision,
    GoalReached,
}

impl DoneReason {
    /// Numeric code used in logs: 0 timeout, 1 collision, 2 goal reached.
    pub fn code(&self) -> u8 {
        match self {
            DoneReason::Timeout => 0,
            DoneReason::Collision => 1,
            DoneReason::GoalReached => 2,
        }
    }
}

impl fmt::Display for DoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Statistics of a finished episode, attached by [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeRecord {
    pub reward: f64,
    pub length: usize,
    /// Seconds since the monitor was created.
    pub time: f64,
}

/// Side information of a step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Set when the episode ended.
    pub done_reason: Option<DoneReason>,
    /// Set when the episode ended.
    pub is_success: Option<bool>,
    /// Set by [`Monitor`] when the episode ended.
    pub episode: Option<EpisodeRecord>,
}

/// Result of stepping a single environment.
#[derive(Debug, Clone)]
pub struct EnvStep {
    pub obs: Vec<f32>,
    pub reward: f32,
    /// Episode ended by the task (collision or goal).
    pub terminal: bool,
    /// Episode cut by the step limit.
    pub truncated: bool,
    pub info: StepInfo,
}

impl EnvStep {
    #[inline]
    pub fn done(&self) -> bool {
        self.terminal || self.truncated
    }
}

// ============================================================================
// Environment trait
// ============================================================================

/// A single navigation simulation.
pub trait NavEnv: Send {
    /// Namespace the simulation runs in (`""` for the root namespace).
    fn namespace(&self) -> &str;

    /// Length of the flat observation vector.
    fn obs_size(&self) -> usize;

    /// Number of laser beams at the start of each observation.
    fn scan_size(&self) -> usize;

    fn action_space(&self) -> &ActionSpace;

    fn seed(&mut self, seed: u64);

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Vec<f32>>;

    fn step(&mut self, action: &Action) -> Result<EnvStep>;

    /// Release simulation resources.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: NavEnv + ?Sized> NavEnv for Box<E> {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    fn obs_size(&self) -> usize {
        (**self).obs_size()
    }

    fn scan_size(&self) -> usize {
        (**self).scan_size()
    }

    fn action_space(&self) -> &ActionSpace {
        (**self).action_space()
    }

    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }

    fn reset(&mut self) -> Result<Vec<f32>> {
        (**self).reset()
    }

    fn step(&mut self, action: &Action) -> Result<EnvStep> {
        (**self).step(action)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discrete_velocity() {
        let space = ActionSpace::Discrete(vec![
            DiscreteAction {
                name: "forward".into(),
                linear: 0.3,
                angular: 0.0,
            },
            DiscreteAction {
                name: "left".into(),
                linear: 0.1,
                angular: 0.5,
            },
        ]);
        assert_eq!(space.n_outputs(), 2);
        assert_eq!(space.velocity(&Action::Discrete(1)), (0.1, 0.5));
        assert_eq!(space.velocity(&Action::Discrete(7)), (0.0, 0.0));
    }

    #[test]
    fn test_continuous_velocity_is_clipped() {
        let space = ActionSpace::Continuous {
            low: vec![0.0, -1.0],
            high: vec![0.3, 1.0],
        };
        assert!(!space.is_discrete());
        assert_eq!(
            space.velocity(&Action::Continuous(vec![0.5, -2.0])),
            (0.3, -1.0)
        );
    }

    #[test]
    fn test_done_reason_codes() {
        assert_eq!(DoneReason::Timeout.code(), 0);
        assert_eq!(DoneReason::Collision.code(), 1);
        assert_eq!(DoneReason::GoalReached.to_string(), "2");
    }
}
