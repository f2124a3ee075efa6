//! Command line of `train_agent`.

use clap::builder::PossibleValuesParser;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use nav_rl::agents::{Activation, AgentSelection, AGENT_NAMES};
use nav_rl::paths::{LogToggles, PathRoots};

/// Timesteps trained when `--n` is not given.
pub const DEFAULT_TIMESTEPS: u64 = 40_000_000;

#[derive(Debug, Clone, Parser)]
#[command(name = "train_agent", version, about = "Train a DRL local planner agent")]
#[command(group(
    ArgGroup::new("agent_selection")
        .required(true)
        .args(["agent", "custom_mlp", "load"])
))]
pub struct Args {
    /// Predefined agent to train from scratch
    #[arg(long, value_parser = PossibleValuesParser::new(AGENT_NAMES))]
    pub agent: Option<String>,

    /// Train a custom MLP built from --body, --pi, --vf and --act-fn
    #[arg(long)]
    pub custom_mlp: bool,

    /// Agent directory to resume training from
    #[arg(long, value_name = "AGENT_DIR_NAME")]
    pub load: Option<String>,

    /// Number of parallel simulation environments
    #[arg(long, default_value_t = 1)]
    pub n_envs: usize,

    /// Timesteps to train
    #[arg(long, value_name = "STEPS")]
    pub n: Option<u64>,

    /// Hyperparameter preset under configs/hyperparameters
    #[arg(long, default_value = "default")]
    pub config: String,

    /// Write tensorboard-style progress logs
    #[arg(long)]
    pub tb: bool,

    /// Write evaluation logs
    #[arg(long)]
    pub eval_log: bool,

    /// Step environments in-process and log at debug level
    #[arg(long)]
    pub debug: bool,

    /// Use the CPU backend even when the GPU backend is available
    #[arg(long)]
    pub no_gpu: bool,

    /// Shared layers of the custom MLP, e.g. 64-64
    #[arg(long, default_value = "")]
    pub body: String,

    /// Policy layers of the custom MLP
    #[arg(long, default_value = "")]
    pub pi: String,

    /// Value layers of the custom MLP
    #[arg(long, default_value = "")]
    pub vf: String,

    /// Activation of the custom MLP
    #[arg(long, default_value = "relu", value_parser = PossibleValuesParser::new(Activation::NAMES))]
    pub act_fn: String,

    /// Root of the planner package
    #[arg(long, env = "ARENA_DRL_DIR", default_value = ".")]
    pub pkg_dir: PathBuf,

    /// Root of the simulator setup package [default: <pkg-dir>/../simulator_setup]
    #[arg(long, env = "SIMULATOR_SETUP_DIR")]
    pub simulator_setup_dir: Option<PathBuf>,

    /// ROS master to poll for simulation nodes; the built-in simulation runs without one
    #[arg(long, env = "ROS_MASTER_URI")]
    pub ros_master_uri: Option<String>,

    /// Base seed of the environments
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

impl Args {
    /// Agent selected by the mutually exclusive selection flags.
    pub fn selection(&self) -> nav_rl::Result<AgentSelection> {
        if let Some(name) = &self.load {
            return Ok(AgentSelection::Load(name.clone()));
        }
        if self.custom_mlp {
            return Ok(AgentSelection::CustomMlp {
                body: self.body.clone(),
                pi: self.pi.clone(),
                vf: self.vf.clone(),
                act_fn: self.act_fn.parse()?,
            });
        }
        match &self.agent {
            Some(agent) => Ok(AgentSelection::Predefined(agent.clone())),
            None => Err(nav_rl::Error::invalid(
                "agent",
                "one of --agent, --custom-mlp or --load is required",
            )),
        }
    }

    /// Custom network flags that are set but have no effect.
    pub fn unused_custom_flags(&self) -> Vec<&'static str> {
        if self.custom_mlp {
            return Vec::new();
        }
        let mut unused = Vec::new();
        for (name, value) in [("--body", &self.body), ("--pi", &self.pi), ("--vf", &self.vf)] {
            if !value.is_empty() {
                unused.push(name);
            }
        }
        if self.act_fn != "relu" {
            unused.push("--act-fn");
        }
        unused
    }

    pub fn n_timesteps(&self) -> u64 {
        self.n.unwrap_or(DEFAULT_TIMESTEPS)
    }

    pub fn roots(&self) -> PathRoots {
        match &self.simulator_setup_dir {
            Some(sim) => PathRoots::new(&self.pkg_dir, sim),
            None => PathRoots::from_package(&self.pkg_dir),
        }
    }

    pub fn log_toggles(&self) -> LogToggles {
        LogToggles {
            tensorboard: self.tb,
            eval_log: self.eval_log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("train_agent").chain(args.iter().copied()))
    }

    #[test]
    fn test_exactly_one_selection_flag() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--agent", "AGENT_1", "--load", "x"]).is_err());
        assert!(parse(&["--custom-mlp", "--agent", "AGENT_1"]).is_err());
        assert!(parse(&["--agent", "AGENT_1"]).is_ok());
        assert!(parse(&["--load", "AGENT_1_2021_03_07__09_05"]).is_ok());
    }

    #[test]
    fn test_unknown_agent_rejected() {
        assert!(parse(&["--agent", "AGENT_21"]).is_err());
        assert!(parse(&["--custom-mlp", "--act-fn", "gelu"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--agent", "MLP_ARENA2D", "--pkg-dir", "/pkg"]).unwrap();
        assert_eq!(args.n_envs, 1);
        assert_eq!(args.n_timesteps(), DEFAULT_TIMESTEPS);
        assert_eq!(args.config, "default");
        assert_eq!(args.log_toggles(), LogToggles::default());
        assert_eq!(
            args.selection().unwrap(),
            AgentSelection::Predefined("MLP_ARENA2D".into())
        );
        if std::env::var_os("SIMULATOR_SETUP_DIR").is_none() {
            assert_eq!(
                args.roots().simulator_setup_dir,
                PathBuf::from("/pkg/../simulator_setup")
            );
        }
    }

    #[test]
    fn test_custom_mlp_selection() {
        let args = parse(&[
            "--custom-mlp",
            "--body",
            "256-128",
            "--pi",
            "256",
            "--vf",
            "16",
            "--act-fn",
            "tanh",
            "--n",
            "1000",
            "--tb",
        ])
        .unwrap();
        assert_eq!(args.n_timesteps(), 1000);
        assert!(args.log_toggles().tensorboard);
        assert!(args.unused_custom_flags().is_empty());
        assert_eq!(
            args.selection().unwrap(),
            AgentSelection::CustomMlp {
                body: "256-128".into(),
                pi: "256".into(),
                vf: "16".into(),
                act_fn: Activation::Tanh,
            }
        );
    }

    #[test]
    fn test_custom_flags_without_custom_mlp_are_reported() {
        let args = parse(&["--agent", "AGENT_3", "--body", "64", "--act-fn", "tanh"]).unwrap();
        assert_eq!(args.unused_custom_flags(), vec!["--body", "--act-fn"]);
        assert_eq!(
            args.selection().unwrap(),
            AgentSelection::Predefined("AGENT_3".into())
        );
    }
}
