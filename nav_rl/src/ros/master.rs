//! XML-RPC client for the ROS master API.

use std::collections::BTreeSet;
use std::time::Duration;

use super::xmlrpc::{encode_call, parse_response, Value};
use super::NodeRegistry;
use crate::error::{Error, Result};

/// Caller id reported to the master.
const CALLER_ID: &str = "/train_agent";

/// Node registry backed by a running ROS master.
#[derive(Debug, Clone)]
pub struct RosMaster {
    uri: String,
    agent: ureq::Agent,
}

impl RosMaster {
    /// Client for the master at `uri`, e.g. `http://localhost:11311`.
    pub fn new(uri: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();
        Self {
            uri: uri.into(),
            agent,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Call a master method and unwrap the `[code, status, value]` triple.
    fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        let body = encode_call(method, params);
        let response = self
            .agent
            .post(&self.uri)
            .set("Content-Type", "text/xml")
            .send_string(&body)
            .map_err(|e| Error::Registry(format!("{} at {}: {}", method, self.uri, e)))?;
        let text = response
            .into_string()
            .map_err(|e| Error::Registry(format!("{}: {}", method, e)))?;
        unwrap_master_reply(method, parse_response(&text)?)
    }
}

fn unwrap_master_reply(method: &str, reply: Value) -> Result<Value> {
    let items = match reply {
        Value::Array(items) if items.len() == 3 => items,
        other => {
            return Err(Error::Registry(format!(
                "{}: unexpected reply {:?}",
                method, other
            )))
        }
    };
    let mut items = items.into_iter();
    let code = items.next().and_then(|v| v.as_int()).unwrap_or(-1);
    let status = items
        .next()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    if code != 1 {
        return Err(Error::Registry(format!(
            "{} failed with code {}: {}",
            method, code, status
        )));
    }
    items
        .next()
        .ok_or_else(|| Error::Registry(format!("{}: missing value", method)))
}

/// Collect node names from a `getSystemState` value.
///
/// The state is `[publishers, subscribers, services]`, each a list of
/// `[name, [node, ...]]` pairs.
fn nodes_from_system_state(state: &Value) -> BTreeSet<String> {
    let mut nodes = BTreeSet::new();
    for category in state.as_array().unwrap_or_default() {
        for entry in category.as_array().unwrap_or_default() {
            let providers = entry
                .as_array()
                .and_then(|pair| pair.get(1))
                .and_then(Value::as_array)
                .unwrap_or_default();
            nodes.extend(providers.iter().filter_map(Value::as_str).map(str::to_string));
        }
    }
    nodes
}

/// Keep nodes inside `namespace`; the root namespace keeps everything.
fn filter_namespace(nodes: impl IntoIterator<Item = String>, namespace: &str) -> Vec<String> {
    let trimmed = namespace.trim_matches('/');
    if trimmed.is_empty() {
        return nodes.into_iter().collect();
    }
    let prefix = format!("/{}/", trimmed);
    nodes.into_iter().filter(|n| n.starts_with(&prefix)).collect()
}

impl NodeRegistry for RosMaster {
    fn node_names(&self, namespace: &str) -> Result<Vec<String>> {
        let state = self.call("getSystemState", &[Value::Str(CALLER_ID.into())])?;
        Ok(filter_namespace(nodes_from_system_state(&state), namespace))
    }

    fn param_names(&self) -> Result<Vec<String>> {
        let names = self.call("getParamNames", &[Value::Str(CALLER_ID.into())])?;
        Ok(names
            .as_array()
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }
}
