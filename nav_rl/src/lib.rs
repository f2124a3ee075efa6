//! # nav_rl: DRL Local Planner Training
//!
//! Building blocks for training navigation agents with PPO against a set of
//! simulation namespaces.
//!
//! ## Training Flow
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌─────────────────────────┐
//! │ AgentPaths   │──▶│ Hyperparameters  │──▶│ ROS master: wait for    │
//! │ (agents/)    │   │ (hyperparams)    │   │ simulation namespaces   │
//! └──────────────┘   └──────────────────┘   └───────────┬─────────────┘
//!                                                       ▼
//!  ┌──────────────────────┐   ┌─────────────────────────────────────┐
//!  │ EvalCallback         │◀──│ VecNormalize(SequentialVecEnv |     │
//!  │ ├ InitiateNewTrain-  │   │              ThreadedVecEnv)        │
//!  │ │ Stage (curriculum) │   └───────────────┬─────────────────────┘
//!  │ └ StopTrainingOn-    │                   ▼
//!  │   RewardThreshold    │◀──────────  PpoAgent::learn
//!  └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use nav_rl::ppo::{PpoAgent, PpoSettings};
//!
//! let mut agent = PpoAgent::<B>::new(architecture, PpoSettings::default(), &env, device)?;
//! let outcome = agent.learn(&mut env, 1_000_000, &mut callbacks, &interrupt)?;
//! agent.save(&paths.model_file())?;
//! ```

pub mod agents;
pub mod callbacks;
pub mod checkpoint;
pub mod core;
pub mod curriculum;
pub mod env;
pub mod error;
pub mod files;
pub mod hyperparams;
pub mod metrics;
pub mod nn;
pub mod paths;
pub mod ppo;
pub mod ros;

pub use error::{Error, Result};

// Re-export commonly used types
pub use agents::{AgentSelection, PolicyArchitecture, AGENT_NAMES};
pub use callbacks::{
    EvalCallback, EvalConfig, InitiateNewTrainStage, StopTrainingOnRewardThreshold,
    ThresholdType, TrainingCallback,
};
pub use curriculum::Curriculum;
pub use env::{VecEnv, VecNormalize, VecNormalizeConfig};
pub use hyperparams::{Hyperparameters, TaskMode};
pub use paths::AgentPaths;
pub use ppo::{LearnOutcome, Policy, PpoAgent, PpoSettings, StopReason};
