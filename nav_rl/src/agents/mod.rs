//! Agent selection: predefined network recipes, custom MLPs and directory names.

mod architecture;
mod naming;
mod registry;

pub use architecture::{
    parse_layers, Activation, ConvLayer, FeatureExtractor, PolicyArchitecture, PolicyFamily,
};
pub use naming::{agent_name, format_start_time, AgentSelection, START_TIME_FORMAT};
pub use registry::{is_predefined, predefined_architecture, AGENT_NAMES};

use crate::error::{Error, Result};

/// Network recipe for a new agent.
///
/// Returns `None` when loading, since the recipe then comes from the checkpoint.
pub fn architecture_for(selection: &AgentSelection) -> Result<Option<PolicyArchitecture>> {
    match selection {
        AgentSelection::Predefined(name) => predefined_architecture(name)
            .map(Some)
            .ok_or_else(|| Error::invalid("agent", format!("unknown agent '{}'", name))),
        AgentSelection::CustomMlp {
            body,
            pi,
            vf,
            act_fn,
        } => Ok(Some(PolicyArchitecture {
            features: FeatureExtractor::Flat,
            body: parse_layers("body", body)?,
            pi: parse_layers("pi", pi)?,
            vf: parse_layers("vf", vf)?,
            activation: *act_fn,
        })),
        AgentSelection::Load(_) => Ok(None),
    }
}
