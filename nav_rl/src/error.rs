//! Error types for the training toolkit.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Result type for nav_rl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or running a training session.
#[derive(Debug)]
pub enum Error {
    /// Filesystem access failed.
    Io { path: PathBuf, source: io::Error },
    /// A JSON document could not be read or written.
    Json { path: PathBuf, source: serde_json::Error },
    /// A YAML document could not be parsed.
    Yaml { path: PathBuf, source: serde_yaml::Error },
    /// Invalid configuration (batch sizes, env counts, thresholds, ...).
    InvalidConfig { param: String, message: String },
    /// A file that the run depends on does not exist.
    NotFound { what: String, path: PathBuf },
    /// Refusing to overwrite an existing agent directory.
    AlreadyExists(PathBuf),
    /// The node registry could not be queried.
    Registry(String),
    /// Simulation nodes did not come up in time.
    NodeTimeout { namespace: String, attempts: usize },
    /// An environment failed or its worker died.
    Env(String),
    /// Burn recorder failure while saving or loading a policy.
    Recorder(String),
    /// Tensor data could not be converted.
    Tensor(String),
}

impl Error {
    /// Attach a path to an IO error.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build an [`Error::InvalidConfig`].
    pub fn invalid(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            param: param.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "IO error on '{}': {}", path.display(), source),
            Self::Json { path, source } => {
                write!(f, "Invalid JSON in '{}': {}", path.display(), source)
            }
            Self::Yaml { path, source } => {
                write!(f, "Invalid YAML in '{}': {}", path.display(), source)
            }
            Self::InvalidConfig { param, message } => {
                write!(f, "Invalid configuration for '{}': {}", param, message)
            }
            Self::NotFound { what, path } => {
                write!(f, "Couldn't find {} in '{}'", what, path.display())
            }
            Self::AlreadyExists(path) => {
                write!(f, "Agent directory '{}' already exists", path.display())
            }
            Self::Registry(msg) => write!(f, "Node registry error: {}", msg),
            Self::NodeTimeout {
                namespace,
                attempts,
            } => write!(
                f,
                "Timeout while trying to connect to nodes of '{}' ({} attempts)",
                namespace, attempts
            ),
            Self::Env(msg) => write!(f, "Environment error: {}", msg),
            Self::Recorder(msg) => write!(f, "Recorder error: {}", msg),
            Self::Tensor(msg) => write!(f, "Tensor error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Yaml { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<crossbeam_channel::RecvError> for Error {
    fn from(_: crossbeam_channel::RecvError) -> Self {
        Self::Env("environment worker disconnected".into())
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        Self::Env("environment worker disconnected".into())
    }
}
