//! Reward rules of the navigation task.
//!
//! Each rule is a sum of terms evaluated on the laser scan and the goal
//! position in robot coordinates:
//!
//! - goal reached: `+15` and the episode ends
//! - safe distance: `-0.25` while an obstacle is closer than the safe distance
//! - collision: `-10` and the episode ends
//! - goal approached: `0.3 * progress` when getting closer, `0.4 * progress`
//!   (negative) when moving away
//! - distance traveled (`rule_01` only): small energy cost per command

use super::DoneReason;
use crate::hyperparams::RewardRule;

const GOAL_REWARD: f32 = 15.0;
const COLLISION_PUNISHMENT: f32 = 10.0;
const SAFE_DIST_PUNISHMENT: f32 = 0.25;
const APPROACH_REWARD_FACTOR: f32 = 0.3;
const APPROACH_PENALTY_FACTOR: f32 = 0.4;
const CONSUMPTION_FACTOR: f32 = 0.0075;

/// Ratio of robot radius kept free before the safe-distance penalty applies.
pub const SAFE_DIST_FACTOR: f32 = 1.6;

/// Reward of one step and the episode outcome it implies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardOutcome {
    pub reward: f32,
    /// Set when the step ends the episode.
    pub done_reason: Option<DoneReason>,
}

/// Stateful reward evaluation for one environment.
#[derive(Debug, Clone)]
pub struct RewardCalculator {
    rule: RewardRule,
    robot_radius: f32,
    goal_radius: f32,
    safe_dist: f32,
    last_goal_dist: Option<f32>,
}

impl RewardCalculator {
    pub fn new(rule: RewardRule, robot_radius: f32, goal_radius: f32) -> Self {
        Self {
            rule,
            robot_radius,
            goal_radius,
            safe_dist: SAFE_DIST_FACTOR * robot_radius,
            last_goal_dist: None,
        }
    }

    /// Forget the previous goal distance at the start of an episode.
    pub fn reset(&mut self) {
        self.last_goal_dist = None;
    }

    /// Evaluate one step.
    ///
    /// `goal_dist` is the distance to the goal, `min_scan` the closest laser
    /// reading and `velocity` the executed `(linear, angular)` command.
    pub fn compute(&mut self, goal_dist: f32, min_scan: f32, velocity: (f32, f32)) -> RewardOutcome {
        let mut reward = 0.0;
        let mut done_reason = None;

        if self.rule == RewardRule::Rule01 {
            let (linear, angular) = velocity;
            reward -= (linear.abs() + 0.001 * angular.abs()) * CONSUMPTION_FACTOR;
        }

        if goal_dist < self.goal_radius {
            reward += GOAL_REWARD;
            done_reason = Some(DoneReason::GoalReached);
        }

        if min_scan < self.safe_dist {
            reward -= SAFE_DIST_PUNISHMENT;
        }

        // A collision overrides reaching the goal in the same step.
        if min_scan <= self.robot_radius {
            reward -= COLLISION_PUNISHMENT;
            done_reason = Some(DoneReason::Collision);
        }

        if let Some(last) = self.last_goal_dist {
            let progress = last - goal_dist;
            let factor = if progress > 0.0 {
                APPROACH_REWARD_FACTOR
            } else {
                APPROACH_PENALTY_FACTOR
            };
            reward += factor * progress;
        }
        self.last_goal_dist = Some(goal_dist);

        RewardOutcome {
            reward,
            done_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(rule: RewardRule) -> RewardCalculator {
        RewardCalculator::new(rule, 0.3, 0.25)
    }

    #[test]
    fn test_goal_approach_is_asymmetric() {
        let mut rc = calc(RewardRule::Rule00);
        assert_eq!(rc.compute(5.0, 4.0, (0.1, 0.0)).reward, 0.0);

        let closer = rc.compute(4.0, 4.0, (0.1, 0.0));
        assert!((closer.reward - 0.3).abs() < 1e-6);
        assert!(closer.done_reason.is_none());

        let away = rc.compute(5.0, 4.0, (0.1, 0.0));
        assert!((away.reward + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_goal_and_collision() {
        let mut rc = calc(RewardRule::Rule00);
        let goal = rc.compute(0.1, 4.0, (0.0, 0.0));
        assert_eq!(goal.done_reason, Some(DoneReason::GoalReached));
        assert!((goal.reward - 15.0).abs() < 1e-6);

        rc.reset();
        let crash = rc.compute(0.1, 0.2, (0.0, 0.0));
        assert_eq!(crash.done_reason, Some(DoneReason::Collision));
        assert!((crash.reward - (15.0 - 0.25 - 10.0)).abs() < 1e-6);
    }

    #[test]
    fn test_safe_distance_penalty() {
        let mut rc = calc(RewardRule::Rule00);
        let near = rc.compute(3.0, 0.4, (0.0, 0.0));
        assert!((near.reward + 0.25).abs() < 1e-6);
        assert!(near.done_reason.is_none());
    }

    #[test]
    fn test_rule_01_charges_motion() {
        let mut rc = calc(RewardRule::Rule01);
        let r = rc.compute(3.0, 4.0, (0.2, 1.0)).reward;
        assert!(r < 0.0);
        assert!((r + (0.2 + 0.001) * 0.0075).abs() < 1e-7);
    }
}
