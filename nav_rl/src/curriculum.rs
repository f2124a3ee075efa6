//! Training curriculum.
//!
//! The curriculum file maps stage numbers (starting at 1) to obstacle counts:
//!
//! ```yaml
//! 1:
//!   static: 0
//!   dynamic: 0
//! 2:
//!   static: 5
//!   dynamic: 2
//! ```
//!
//! A [`Curriculum`] is a cheap shared handle. Every environment holds a clone
//! and reads the current stage when it starts an episode, so a stage change
//! made by the training callbacks reaches all namespaces at once.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::files::{read_json, read_yaml, write_json};

/// Obstacle counts of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(rename = "static")]
    pub static_obstacles: usize,
    #[serde(rename = "dynamic")]
    pub dynamic_obstacles: usize,
}

/// Outcome of a stage transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageChange {
    Moved { from: usize, to: usize },
    /// Already at the first or last stage.
    Unchanged(usize),
}

#[derive(Debug)]
struct CurriculumState {
    stage: usize,
    last_stage_reached: bool,
}

/// Shared curriculum handle.
#[derive(Debug, Clone)]
pub struct Curriculum {
    stages: Arc<BTreeMap<usize, StageSpec>>,
    state: Arc<RwLock<CurriculumState>>,
    /// Agent record whose `curr_stage` follows the curriculum.
    record: Option<PathBuf>,
}

impl Curriculum {
    /// Build from an explicit stage table.
    pub fn from_stages(stages: BTreeMap<usize, StageSpec>, start_stage: usize) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::invalid("curriculum", "no stages defined"));
        }
        for (expected, stage) in (1..).zip(stages.keys()) {
            if *stage != expected {
                return Err(Error::invalid(
                    "curriculum",
                    format!("stages must be numbered 1..n, found {}", stage),
                ));
            }
        }
        if !stages.contains_key(&start_stage) {
            return Err(Error::invalid(
                "curr_stage",
                format!(
                    "stage {} not in curriculum with {} stages",
                    start_stage,
                    stages.len()
                ),
            ));
        }
        let last_stage_reached = start_stage == stages.len();
        Ok(Self {
            stages: Arc::new(stages),
            state: Arc::new(RwLock::new(CurriculumState {
                stage: start_stage,
                last_stage_reached,
            })),
            record: None,
        })
    }

    /// Load the stage table from a curriculum YAML file.
    pub fn load(path: &Path, start_stage: usize) -> Result<Self> {
        let stages: BTreeMap<usize, StageSpec> = read_yaml(path)?;
        Self::from_stages(stages, start_stage)
    }

    /// Keep `curr_stage` of the given hyperparameter file in sync.
    pub fn with_record(mut self, path: impl Into<PathBuf>) -> Self {
        self.record = Some(path.into());
        self
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn current_stage(&self) -> usize {
        self.state.read().stage
    }

    /// Obstacle counts of the current stage.
    pub fn current_spec(&self) -> StageSpec {
        let stage = self.current_stage();
        self.stages[&stage]
    }

    pub fn last_stage_reached(&self) -> bool {
        self.state.read().last_stage_reached
    }

    /// Advance one stage.
    pub fn next_stage(&self) -> Result<StageChange> {
        let change = {
            let mut state = self.state.write();
            if state.stage < self.stages.len() {
                let from = state.stage;
                state.stage += 1;
                state.last_stage_reached = state.stage == self.stages.len();
                StageChange::Moved {
                    from,
                    to: state.stage,
                }
            } else {
                state.last_stage_reached = true;
                StageChange::Unchanged(state.stage)
            }
        };
        self.announce(change, "last")?;
        Ok(change)
    }

    /// Go back one stage.
    pub fn previous_stage(&self) -> Result<StageChange> {
        let change = {
            let mut state = self.state.write();
            if state.stage > 1 {
                let from = state.stage;
                state.stage -= 1;
                state.last_stage_reached = false;
                StageChange::Moved {
                    from,
                    to: state.stage,
                }
            } else {
                StageChange::Unchanged(state.stage)
            }
        };
        self.announce(change, "first")?;
        Ok(change)
    }

    fn announce(&self, change: StageChange, bound: &str) -> Result<()> {
        match change {
            StageChange::Moved { from, to } => {
                let spec = self.stages[&to];
                log::info!(
                    "({}) Stage {} -> {}: {} static, {} dynamic obstacles",
                    chrono::Local::now().format("%H:%M:%S"),
                    from,
                    to,
                    spec.static_obstacles,
                    spec.dynamic_obstacles
                );
                self.persist(to)
            }
            StageChange::Unchanged(stage) => {
                log::info!("Stage {} is already the {} stage", stage, bound);
                Ok(())
            }
        }
    }

    fn persist(&self, stage: usize) -> Result<()> {
        let Some(path) = &self.record else {
            return Ok(());
        };
        if !path.is_file() {
            return Ok(());
        }
        let mut doc: serde_json::Value = read_json(path)?;
        if let Some(map) = doc.as_object_mut() {
            map.insert("curr_stage".to_string(), stage.into());
        }
        write_json(path, &doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn stages(n: usize) -> BTreeMap<usize, StageSpec> {
        (1..=n)
            .map(|i| {
                (
                    i,
                    StageSpec {
                        static_obstacles: i * 2,
                        dynamic_obstacles: i - 1,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("curriculum.yaml");
        fs::write(&path, "1:\n  static: 0\n  dynamic: 0\n2:\n  static: 5\n  dynamic: 2\n").unwrap();

        let curriculum = Curriculum::load(&path, 1).unwrap();
        assert_eq!(curriculum.n_stages(), 2);
        assert_eq!(
            curriculum.current_spec(),
            StageSpec {
                static_obstacles: 0,
                dynamic_obstacles: 0
            }
        );
        assert!(Curriculum::load(&path, 3).is_err());
    }

    #[test]
    fn test_rejects_gaps() {
        let mut table = stages(3);
        table.remove(&2);
        assert!(Curriculum::from_stages(table, 1).is_err());
        assert!(Curriculum::from_stages(BTreeMap::new(), 1).is_err());
    }

    #[test]
    fn test_stage_transitions_are_shared() {
        let curriculum = Curriculum::from_stages(stages(3), 1).unwrap();
        let env_view = curriculum.clone();

        assert_eq!(curriculum.previous_stage().unwrap(), StageChange::Unchanged(1));
        assert_eq!(
            curriculum.next_stage().unwrap(),
            StageChange::Moved { from: 1, to: 2 }
        );
        assert_eq!(env_view.current_stage(), 2);
        assert!(!env_view.last_stage_reached());

        curriculum.next_stage().unwrap();
        assert!(env_view.last_stage_reached());
        assert_eq!(curriculum.next_stage().unwrap(), StageChange::Unchanged(3));

        curriculum.previous_stage().unwrap();
        assert_eq!(env_view.current_stage(), 2);
        assert!(!env_view.last_stage_reached());
        assert_eq!(env_view.current_spec().static_obstacles, 4);
    }

    #[test]
    fn test_stage_is_persisted_to_record() {
        let dir = TempDir::new().unwrap();
        let record = dir.path().join("hyperparameters.json");
        fs::write(&record, r#"{"curr_stage": 1, "gamma": 0.99}"#).unwrap();

        let curriculum = Curriculum::from_stages(stages(3), 1)
            .unwrap()
            .with_record(&record);
        curriculum.next_stage().unwrap();

        let doc: serde_json::Value = read_json(&record).unwrap();
        assert_eq!(doc["curr_stage"], 2);
        assert_eq!(doc["gamma"], 0.99);
    }
}
