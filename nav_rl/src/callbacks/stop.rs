//! Early stopping once the agent is good enough.

use super::{EvalHook, EvalState, ThresholdType};
use crate::error::Result;

/// Stops training when the tracked metric reaches `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopTrainingOnRewardThreshold {
    threshold_type: ThresholdType,
    threshold: f64,
}

impl StopTrainingOnRewardThreshold {
    pub fn new(threshold_type: ThresholdType, threshold: f64) -> Self {
        Self {
            threshold_type,
            threshold,
        }
    }
}

impl EvalHook for StopTrainingOnRewardThreshold {
    fn on_eval(&mut self, state: &mut EvalState) -> Result<bool> {
        let value = self.threshold_type.value(state);
        let continue_training = value < self.threshold;
        if !continue_training {
            log::info!(
                "Stopping training because the {} threshold {} was reached ({:.3})",
                self.threshold_type,
                self.threshold,
                value
            );
        }
        Ok(continue_training)
    }
}
