//! Curriculum stage switching from evaluation results.

use super::{EvalHook, EvalState, ThresholdType};
use crate::curriculum::{Curriculum, StageChange};
use crate::error::{Error, Result};
use crate::hyperparams::TaskMode;

/// Fewer evaluation episodes than this give noisy thresholds.
const MIN_RELIABLE_EPISODES: usize = 20;

/// Moves the curriculum after each evaluation.
///
/// At or below `lower_threshold` the previous stage is loaded; at or above
/// `upper_threshold` the next one. Only active in staged task mode.
#[derive(Debug, Clone)]
pub struct InitiateNewTrainStage {
    threshold_type: ThresholdType,
    upper_threshold: f64,
    lower_threshold: f64,
    curriculum: Curriculum,
    active: bool,
}

impl InitiateNewTrainStage {
    pub fn new(
        threshold_type: ThresholdType,
        upper_threshold: f64,
        lower_threshold: f64,
        task_mode: TaskMode,
        curriculum: Curriculum,
    ) -> Result<Self> {
        match threshold_type {
            ThresholdType::Rew if upper_threshold <= lower_threshold => {
                return Err(Error::invalid(
                    "threshold",
                    format!(
                        "upper reward threshold {} must be above lower threshold {}",
                        upper_threshold, lower_threshold
                    ),
                ));
            }
            ThresholdType::Succ
                if !(0.0 <= lower_threshold
                    && lower_threshold < upper_threshold
                    && upper_threshold <= 1.0) =>
            {
                return Err(Error::invalid(
                    "threshold",
                    format!(
                        "success thresholds need 0 <= lower ({}) < upper ({}) <= 1",
                        lower_threshold, upper_threshold
                    ),
                ));
            }
            _ => {}
        }

        Ok(Self {
            threshold_type,
            upper_threshold,
            lower_threshold,
            curriculum,
            active: task_mode == TaskMode::Staged,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl EvalHook for InitiateNewTrainStage {
    fn on_eval(&mut self, state: &mut EvalState) -> Result<bool> {
        if !self.active {
            return Ok(true);
        }
        if state.n_eval_episodes < MIN_RELIABLE_EPISODES {
            log::warn!(
                "Only {} evaluation episodes considered for threshold monitoring, \
                 results might not represent agent performance well",
                state.n_eval_episodes
            );
        }

        let value = self.threshold_type.value(state);
        if value <= self.lower_threshold {
            if let StageChange::Moved { .. } = self.curriculum.previous_stage()? {
                state.best_mean_reward = f64::NEG_INFINITY;
            }
        } else if value >= self.upper_threshold {
            if !self.curriculum.last_stage_reached() {
                state.best_mean_reward = f64::NEG_INFINITY;
                state.last_success_rate = f64::NEG_INFINITY;
            }
            self.curriculum.next_stage()?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::StageSpec;
    use std::collections::BTreeMap;

    fn curriculum(start: usize) -> Curriculum {
        let stages: BTreeMap<usize, StageSpec> = (1..=3)
            .map(|i| {
                (
                    i,
                    StageSpec {
                        static_obstacles: i,
                        dynamic_obstacles: 0,
                    },
                )
            })
            .collect();
        Curriculum::from_stages(stages, start).unwrap()
    }

    fn state(success_rate: f64) -> EvalState {
        let mut state = EvalState::new(40);
        state.last_success_rate = success_rate;
        state.best_mean_reward = 5.0;
        state
    }

    fn hook(curriculum: &Curriculum, mode: TaskMode) -> InitiateNewTrainStage {
        InitiateNewTrainStage::new(ThresholdType::Succ, 0.85, 0.6, mode, curriculum.clone())
            .unwrap()
    }

    #[test]
    fn test_threshold_validation() {
        let c = curriculum(1);
        let new = |t, upper, lower| {
            InitiateNewTrainStage::new(t, upper, lower, TaskMode::Staged, c.clone())
        };
        assert!(new(ThresholdType::Succ, 0.85, 0.6).is_ok());
        assert!(new(ThresholdType::Succ, 1.2, 0.6).is_err());
        assert!(new(ThresholdType::Succ, 0.5, 0.6).is_err());
        assert!(new(ThresholdType::Succ, 0.5, -0.1).is_err());
        assert!(new(ThresholdType::Rew, 20.0, 10.0).is_ok());
        assert!(new(ThresholdType::Rew, 10.0, 10.0).is_err());
    }

    #[test]
    fn test_high_success_advances_and_resets_best() {
        let c = curriculum(1);
        let mut hook = hook(&c, TaskMode::Staged);
        let mut s = state(0.9);
        assert!(hook.on_eval(&mut s).unwrap());
        assert_eq!(c.current_stage(), 2);
        assert_eq!(s.best_mean_reward, f64::NEG_INFINITY);
        assert_eq!(s.last_success_rate, f64::NEG_INFINITY);
    }

    #[test]
    fn test_low_success_goes_back() {
        let c = curriculum(2);
        let mut hook = hook(&c, TaskMode::Staged);
        let mut s = state(0.3);
        hook.on_eval(&mut s).unwrap();
        assert_eq!(c.current_stage(), 1);
        assert_eq!(s.best_mean_reward, f64::NEG_INFINITY);
    }

    #[test]
    fn test_between_thresholds_keeps_stage() {
        let c = curriculum(2);
        let mut hook = hook(&c, TaskMode::Staged);
        let mut s = state(0.7);
        hook.on_eval(&mut s).unwrap();
        assert_eq!(c.current_stage(), 2);
        assert_eq!(s.best_mean_reward, 5.0);
    }

    #[test]
    fn test_last_stage_keeps_best_reward() {
        let c = curriculum(3);
        c.next_stage().unwrap();
        assert!(c.last_stage_reached());
        let mut hook = hook(&c, TaskMode::Staged);
        let mut s = state(0.95);
        hook.on_eval(&mut s).unwrap();
        assert_eq!(c.current_stage(), 3);
        assert_eq!(s.best_mean_reward, 5.0);
    }

    #[test]
    fn test_inactive_outside_staged_mode() {
        let c = curriculum(1);
        let mut hook = hook(&c, TaskMode::Random);
        assert!(!hook.is_active());
        hook.on_eval(&mut state(1.0)).unwrap();
        assert_eq!(c.current_stage(), 1);
    }
}
