//! Filesystem layout of an agent.
//!
//! Every agent lives in its own directory under `<pkg>/agents/`. Training logs
//! and evaluation logs get sibling directories under `<pkg>/training_logs/`,
//! and are only created when the matching toggle is on.

use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// File name of the best model written by evaluation.
pub const BEST_MODEL: &str = "best_model";

/// Extension of burn policy records.
pub const MODEL_EXTENSION: &str = "bin";

/// File name of saved normalization statistics.
pub const NORMALIZATION_FILE: &str = "vec_normalize.json";

/// Roots the agent layout hangs off.
#[derive(Debug, Clone)]
pub struct PathRoots {
    /// Root of the local planner package.
    pub package_dir: PathBuf,
    /// Root of the simulator setup package holding robot models.
    pub simulator_setup_dir: PathBuf,
}

impl PathRoots {
    pub fn new(package_dir: impl Into<PathBuf>, simulator_setup_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_dir: package_dir.into(),
            simulator_setup_dir: simulator_setup_dir.into(),
        }
    }

    /// Roots with the simulator setup placed next to the package.
    pub fn from_package(package_dir: impl Into<PathBuf>) -> Self {
        let package_dir = package_dir.into();
        let simulator_setup_dir = package_dir.join("..").join("simulator_setup");
        Self {
            package_dir,
            simulator_setup_dir,
        }
    }
}

/// Whether the run starts a new agent or resumes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Load,
}

/// Optional log outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogToggles {
    pub tensorboard: bool,
    pub eval_log: bool,
}

/// Resolved paths of one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentPaths {
    pub agent_name: String,
    pub model: PathBuf,
    pub tb: Option<PathBuf>,
    pub eval: Option<PathBuf>,
    pub robot_setting: PathBuf,
    pub hyperparams: PathBuf,
    pub robot_as: PathBuf,
    pub curriculum: PathBuf,
}

impl AgentPaths {
    /// Resolve the layout for `agent_name` and prepare the directories.
    ///
    /// In [`RunMode::Train`] the model directory is created and must not exist
    /// yet. In [`RunMode::Load`] the directory must hold either
    /// `<agent_name>.bin` or `best_model.bin`.
    pub fn resolve(
        agent_name: &str,
        mode: RunMode,
        toggles: LogToggles,
        roots: &PathRoots,
    ) -> Result<Self> {
        let pkg = &roots.package_dir;
        let logs = pkg.join("training_logs");
        let configs = pkg.join("configs");

        let paths = Self {
            agent_name: agent_name.to_string(),
            model: pkg.join("agents").join(agent_name),
            tb: toggles
                .tensorboard
                .then(|| logs.join("tensorboard").join(agent_name)),
            eval: toggles
                .eval_log
                .then(|| logs.join("train_eval_log").join(agent_name)),
            robot_setting: roots
                .simulator_setup_dir
                .join("robot")
                .join("myrobot.model.yaml"),
            hyperparams: configs.join("hyperparameters"),
            robot_as: configs.join("default_settings.yaml"),
            curriculum: configs.join("training_curriculum_map1small.yaml"),
        };

        match mode {
            RunMode::Train => {
                if paths.model.exists() {
                    return Err(Error::AlreadyExists(paths.model.clone()));
                }
                fs::create_dir_all(&paths.model).map_err(|e| Error::io(&paths.model, e))?;
            }
            RunMode::Load => {
                if paths.resume_model_file().is_none() {
                    return Err(Error::NotFound {
                        what: format!(
                            "model named '{}.{ext}' or '{}.{ext}'",
                            agent_name,
                            BEST_MODEL,
                            ext = MODEL_EXTENSION
                        ),
                        path: paths.model.clone(),
                    });
                }
            }
        }

        for dir in [&paths.eval, &paths.tb].into_iter().flatten() {
            fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }

        Ok(paths)
    }

    /// Final model file, `<model>/<agent_name>.bin`.
    pub fn model_file(&self) -> PathBuf {
        self.model
            .join(format!("{}.{}", self.agent_name, MODEL_EXTENSION))
    }

    /// Best model file written during evaluation.
    pub fn best_model_file(&self) -> PathBuf {
        self.model.join(format!("{}.{}", BEST_MODEL, MODEL_EXTENSION))
    }

    /// Model to resume from: the named model first, then the best model.
    pub fn resume_model_file(&self) -> Option<PathBuf> {
        [self.model_file(), self.best_model_file()]
            .into_iter()
            .find(|p| p.is_file())
    }

    /// Per-agent hyperparameter record.
    pub fn hyperparameters_file(&self) -> PathBuf {
        self.model.join("hyperparameters.json")
    }

    /// Saved normalization statistics.
    pub fn normalization_file(&self) -> PathBuf {
        self.model.join(NORMALIZATION_FILE)
    }

    /// Hyperparameter preset `<hyperparams>/<name>.json`.
    pub fn config_file(&self, config_name: &str) -> PathBuf {
        self.hyperparams.join(format!("{}.json", config_name))
    }
}
