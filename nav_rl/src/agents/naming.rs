//! Agent directory names.

use chrono::{DateTime, Local};

use super::architecture::Activation;

/// Timestamp format appended to freshly created agents.
pub const START_TIME_FORMAT: &str = "%Y_%m_%d__%H_%M";

/// How the agent for this run is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentSelection {
    /// One of the predefined agents, trained from scratch.
    Predefined(String),
    /// Custom MLP built from dash-separated layer strings.
    CustomMlp {
        body: String,
        pi: String,
        vf: String,
        act_fn: Activation,
    },
    /// Resume an existing agent directory.
    Load(String),
}

impl AgentSelection {
    /// Whether a new agent directory is created for this selection.
    pub fn is_new(&self) -> bool {
        !matches!(self, AgentSelection::Load(_))
    }
}

/// Format the start time the way agent names embed it.
pub fn format_start_time(start: &DateTime<Local>) -> String {
    start.format(START_TIME_FORMAT).to_string()
}

/// Name of the agent directory for this run.
pub fn agent_name(selection: &AgentSelection, start: &DateTime<Local>) -> String {
    let start_time = format_start_time(start);
    match selection {
        AgentSelection::CustomMlp {
            body,
            pi,
            vf,
            act_fn,
        } => format!("MLP_B_{}_P_{}_V_{}_{}_{}", body, pi, vf, act_fn, start_time),
        AgentSelection::Predefined(agent) => format!("{}_{}", agent, start_time),
        AgentSelection::Load(name) => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Local> {
        Local.with_ymd_and_hms(2021, 3, 7, 9, 5, 0).unwrap()
    }

    #[test]
    fn test_predefined_name() {
        let name = agent_name(&AgentSelection::Predefined("AGENT_3".into()), &start());
        assert_eq!(name, "AGENT_3_2021_03_07__09_05");
    }

    #[test]
    fn test_custom_mlp_name() {
        let selection = AgentSelection::CustomMlp {
            body: "64-64".into(),
            pi: "32".into(),
            vf: "".into(),
            act_fn: Activation::Tanh,
        };
        assert_eq!(
            agent_name(&selection, &start()),
            "MLP_B_64-64_P_32_V__tanh_2021_03_07__09_05"
        );
    }

    #[test]
    fn test_load_keeps_name() {
        let selection = AgentSelection::Load("AGENT_3_2021_03_07__09_05".into());
        assert_eq!(agent_name(&selection, &start()), "AGENT_3_2021_03_07__09_05");
        assert!(!selection.is_new());
    }
}
