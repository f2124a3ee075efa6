use super::*;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Registry whose namespaces come online after a number of queries.
struct FakeRegistry {
    params: Vec<String>,
    /// namespace -> (queries until up, node count once up)
    schedule: HashMap<String, (usize, usize)>,
    queries: Mutex<HashMap<String, usize>>,
}

impl FakeRegistry {
    fn new(params: &[&str]) -> Self {
        Self {
            params: params.iter().map(|s| s.to_string()).collect(),
            schedule: HashMap::new(),
            queries: Mutex::new(HashMap::new()),
        }
    }

    fn namespace(mut self, ns: &str, up_after: usize, nodes: usize) -> Self {
        self.schedule.insert(ns.to_string(), (up_after, nodes));
        self
    }

    fn queries(&self, ns: &str) -> usize {
        self.queries.lock().get(ns).copied().unwrap_or(0)
    }
}

impl NodeRegistry for FakeRegistry {
    fn node_names(&self, namespace: &str) -> Result<Vec<String>> {
        let mut queries = self.queries.lock();
        let seen = queries.entry(namespace.to_string()).or_insert(0);
        *seen += 1;
        let (up_after, nodes) = self.schedule.get(namespace).copied().unwrap_or((usize::MAX, 0));
        if *seen > up_after {
            Ok((0..nodes).map(|i| format!("/{}/node_{}", namespace, i)).collect())
        } else {
            Ok(Vec::new())
        }
    }

    fn param_names(&self) -> Result<Vec<String>> {
        Ok(self.params.clone())
    }
}

fn fast() -> NodeWaitConfig {
    NodeWaitConfig::new().with_poll_interval(Duration::from_millis(1))
}

#[test]
fn test_layout_detection() {
    let single = FakeRegistry::new(&["/single_env", "/rosdistro"]);
    assert_eq!(SimulationLayout::detect(&single).unwrap(), SimulationLayout::Single);

    let namespaced = FakeRegistry::new(&["/sim_1/goal_radius"]);
    let layout = SimulationLayout::detect(&namespaced).unwrap();
    assert_eq!(layout, SimulationLayout::Namespaced);
    assert!(layout.with_ns());
}

#[test]
fn test_namespaces() {
    assert_eq!(train_namespace(true, 0), "sim_1");
    assert_eq!(train_namespace(true, 3), "sim_4");
    assert_eq!(train_namespace(false, 0), "");
    assert_eq!(eval_namespace(true), "eval_sim");
    assert_eq!(eval_namespace(false), "");
}

#[test]
fn test_env_count_checks() {
    assert!(check_env_count(true, 4).is_ok());
    assert!(check_env_count(true, 0).is_err());
    assert!(check_env_count(false, 1).is_ok());
    assert!(check_env_count(false, 2).is_err());
}

#[test]
fn test_wait_succeeds_after_retries() {
    let registry = FakeRegistry::new(&[])
        .namespace("sim_1", 0, 3)
        .namespace("sim_2", 2, 4);
    wait_for_nodes(&registry, true, 2, &fast()).unwrap();
    assert_eq!(registry.queries("sim_1"), 1);
    assert_eq!(registry.queries("sim_2"), 3);
}

#[test]
fn test_wait_times_out() {
    let registry = FakeRegistry::new(&[])
        .namespace("sim_1", 0, 3)
        .namespace("sim_2", 0, 2);
    let err = wait_for_nodes(&registry, true, 2, &fast()).unwrap_err();
    match err {
        Error::NodeTimeout {
            namespace,
            attempts,
        } => {
            assert_eq!(namespace, "sim_2");
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(registry.queries("sim_2"), 5);
}

#[test]
fn test_wait_single_env_uses_root_namespace() {
    let registry = FakeRegistry::new(&["/single_env"]).namespace("", 1, 3);
    wait_for_nodes(&registry, false, 1, &fast()).unwrap();
    assert_eq!(registry.queries(""), 2);

    assert!(wait_for_nodes(&registry, false, 2, &fast()).is_err());
}
