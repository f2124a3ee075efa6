//! Generalized Advantage Estimation.
//!
//! A_t = δ_t + γλ A_{t+1}, with δ_t = r_t + γ V(s_{t+1}) - V(s_t).
//! The recursion is cut at episode boundaries. Truncated episodes are
//! bootstrapped by the caller, who folds `γ V(final_obs)` into the reward of
//! the last step before calling [`compute_gae`].

/// Advantages and returns for a rollout stored step-major:
/// `[env0_t0, env1_t0, ..., env0_t1, env1_t1, ...]`.
///
/// `dones[t * n_envs + e]` marks that env `e`'s episode ended at step `t`;
/// `last_values[e]` is the value of the observation following the rollout.
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    last_values: &[f32],
    gamma: f32,
    gae_lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n_envs = last_values.len();
    let total = rewards.len();
    assert_eq!(values.len(), total);
    assert_eq!(dones.len(), total);
    assert!(n_envs > 0 && total % n_envs == 0, "rollout is not step-major");

    let n_steps = total / n_envs;
    let mut advantages = vec![0.0f32; total];
    let mut returns = vec![0.0f32; total];

    for env in 0..n_envs {
        let mut gae = 0.0f32;
        let mut next_value = last_values[env];
        for t in (0..n_steps).rev() {
            let i = t * n_envs + env;
            let not_done = if dones[i] { 0.0 } else { 1.0 };
            let delta = rewards[i] + gamma * next_value * not_done - values[i];
            gae = delta + gamma * gae_lambda * not_done * gae;
            advantages[i] = gae;
            returns[i] = gae + values[i];
            next_value = values[i];
        }
    }

    (advantages, returns)
}

/// Normalize to zero mean and unit variance in place.
///
/// Fewer than two values are zeroed.
pub fn normalize_advantages(advantages: &mut [f32]) {
    if advantages.len() < 2 {
        advantages.iter_mut().for_each(|a| *a = 0.0);
        return;
    }
    let n = advantages.len() as f32;
    let mean = advantages.iter().sum::<f32>() / n;
    let var = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n;
    let std = var.sqrt() + 1e-8;
    advantages.iter_mut().for_each(|a| *a = (*a - mean) / std);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_step_is_td_error() {
        let (adv, ret) = compute_gae(&[1.0], &[0.5], &[false], &[2.0], 0.9, 0.95);
        // δ = 1 + 0.9 * 2 - 0.5
        assert!((adv[0] - 2.3).abs() < 1e-6);
        assert!((ret[0] - 2.8).abs() < 1e-6);
    }

    #[test]
    fn test_done_stops_bootstrap() {
        let (adv, _) = compute_gae(&[1.0, 1.0], &[0.0, 0.0], &[true, false], &[10.0], 1.0, 1.0);
        // step 0 ends the episode, so it only sees its own reward
        assert!((adv[0] - 1.0).abs() < 1e-6);
        assert!((adv[1] - 11.0).abs() < 1e-6);
    }

    #[test]
    fn test_lambda_one_gives_discounted_returns() {
        let rewards = [1.0, 1.0, 1.0];
        let (_, ret) = compute_gae(&rewards, &[0.0; 3], &[false; 3], &[0.0], 0.5, 1.0);
        assert!((ret[0] - 1.75).abs() < 1e-6);
        assert!((ret[1] - 1.5).abs() < 1e-6);
        assert!((ret[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_envs_are_independent() {
        // two envs, two steps, env 1 ends at step 0
        let rewards = [1.0, 2.0, 3.0, 4.0];
        let dones = [false, true, false, false];
        let (adv, _) = compute_gae(&rewards, &[0.0; 4], &dones, &[0.0, 0.0], 1.0, 1.0);
        assert_eq!(adv, vec![4.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_normalize_advantages() {
        let mut adv = vec![1.0, 2.0, 3.0, 4.0];
        normalize_advantages(&mut adv);
        let mean: f32 = adv.iter().sum::<f32>() / 4.0;
        let var: f32 = adv.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.0).abs() < 1e-4);

        let mut single = vec![5.0];
        normalize_advantages(&mut single);
        assert_eq!(single, vec![0.0]);
    }
}
