//! Proximal Policy Optimization.
//!
//! ```text
//! VecEnv ──obs──▶ PolicyNet (inference copy) ──actions──▶ VecEnv
//!    │                                                    │
//!    └──────────── RolloutBuffer ◀── rewards, dones ──────┘
//!                       │
//!                 GAE + minibatches ──▶ Adam (clipped surrogate loss)
//! ```

mod agent;
mod gae;
mod loss;
mod network;
mod policy;
mod rollout;

pub use agent::{LearnOutcome, Policy, PpoAgent, PpoSettings, StopReason};
pub use gae::{compute_gae, normalize_advantages};
pub use loss::{ppo_clip_loss, ppo_loss, value_loss, LossComponents};
pub use network::{NetworkShape, PolicyNet, PolicyOutput};
pub use policy::{ActionDistribution, SampledActions};
pub use rollout::{explained_variance, Minibatch, RolloutBuffer};
