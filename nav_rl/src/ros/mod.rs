//! Simulation readiness checks against the middleware node registry.
//!
//! Every parallel simulation runs its nodes inside its own namespace
//! (`sim_1`, `sim_2`, ...). Before training starts we poll the registry until
//! each namespace reports enough nodes, and give up after a bounded number of
//! attempts.

mod master;
mod xmlrpc;

pub use master::RosMaster;

use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

/// Parameter whose presence marks a single, non-namespaced simulation.
pub const SINGLE_ENV_PARAM: &str = "/single_env";

/// Query interface of the node registry.
pub trait NodeRegistry {
    /// Fully qualified names of the nodes inside `namespace` (`""` for all).
    fn node_names(&self, namespace: &str) -> Result<Vec<String>>;

    /// Names of every parameter on the parameter server.
    fn param_names(&self) -> Result<Vec<String>>;
}

/// Whether simulations were launched one per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationLayout {
    /// `sim_1 .. sim_n` plus `eval_sim`.
    Namespaced,
    /// One simulation in the root namespace.
    Single,
}

impl SimulationLayout {
    /// Detect the layout from the parameter server.
    pub fn detect(registry: &dyn NodeRegistry) -> Result<Self> {
        let params = registry.param_names()?;
        if params.iter().any(|p| p == SINGLE_ENV_PARAM) {
            Ok(SimulationLayout::Single)
        } else {
            Ok(SimulationLayout::Namespaced)
        }
    }

    pub fn with_ns(&self) -> bool {
        matches!(self, SimulationLayout::Namespaced)
    }
}

/// Namespace of training environment `rank`.
pub fn train_namespace(with_ns: bool, rank: usize) -> String {
    if with_ns {
        format!("sim_{}", rank + 1)
    } else {
        String::new()
    }
}

/// Namespace of the evaluation environment.
pub fn eval_namespace(with_ns: bool) -> String {
    if with_ns {
        "eval_sim".to_string()
    } else {
        String::new()
    }
}

/// Polling parameters for [`wait_for_nodes`].
#[derive(Debug, Clone)]
pub struct NodeWaitConfig {
    /// Attempts per namespace before giving up.
    pub timeout: usize,
    /// Nodes a namespace needs before it counts as up.
    pub nodes_per_ns: usize,
    /// Pause between attempts.
    pub poll_interval: Duration,
}

impl Default for NodeWaitConfig {
    fn default() -> Self {
        Self {
            timeout: 5,
            nodes_per_ns: 3,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl NodeWaitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: usize) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_nodes_per_ns(mut self, nodes_per_ns: usize) -> Self {
        self.nodes_per_ns = nodes_per_ns;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Check that the environment count fits the simulation layout.
pub fn check_env_count(with_ns: bool, n_envs: usize) -> Result<()> {
    if with_ns && n_envs < 1 {
        return Err(Error::invalid(
            "n_envs",
            format!("Illegal number of environments parsed: {}", n_envs),
        ));
    }
    if !with_ns && n_envs != 1 {
        return Err(Error::invalid(
            "n_envs",
            format!(
                "Simulation setup isn't compatible with the given number of envs ({})",
                n_envs
            ),
        ));
    }
    Ok(())
}

/// Block until every simulation namespace reports its nodes.
///
/// Each namespace gets `config.timeout` attempts. Registry errors count as a
/// miss, so a master that is still starting up is retried as well.
pub fn wait_for_nodes(
    registry: &dyn NodeRegistry,
    with_ns: bool,
    n_envs: usize,
    config: &NodeWaitConfig,
) -> Result<()> {
    check_env_count(with_ns, n_envs)?;

    for rank in 0..n_envs {
        let namespace = train_namespace(with_ns, rank);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match registry.node_names(&namespace) {
                Ok(nodes) if nodes.len() >= config.nodes_per_ns => {
                    log::debug!("namespace '{}' is up with {} nodes", namespace, nodes.len());
                    break;
                }
                Ok(nodes) => log::warn!(
                    "Check if all simulation parts of namespace '{}' are running properly ({} of {} nodes)",
                    namespace,
                    nodes.len(),
                    config.nodes_per_ns
                ),
                Err(e) => log::warn!("Node registry unavailable for '{}': {}", namespace, e),
            }
            if attempt >= config.timeout {
                return Err(Error::NodeTimeout {
                    namespace,
                    attempts: attempt,
                });
            }
            log::warn!("Trying to connect again..");
            thread::sleep(config.poll_interval);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
