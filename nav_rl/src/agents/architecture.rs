//! Policy network descriptions.
//!
//! A [`PolicyArchitecture`] is the serializable recipe for an actor-critic
//! network: how observations are turned into features, which layers are shared,
//! and which layers belong to the policy and value heads. The recipe travels with
//! saved models so a checkpoint can be rebuilt without knowing the agent name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Hidden-layer activation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    /// Names accepted on the command line.
    pub const NAMES: [&'static str; 3] = ["relu", "sigmoid", "tanh"];

    /// Orthogonal-init gain suited for this activation.
    pub fn gain(&self) -> f64 {
        match self {
            Activation::Relu => std::f64::consts::SQRT_2,
            Activation::Sigmoid => 1.0,
            Activation::Tanh => 5.0 / 3.0,
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu" => Ok(Activation::Relu),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            other => Err(Error::invalid(
                "act_fn",
                format!("unknown activation '{}', expected one of {:?}", other, Self::NAMES),
            )),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
        };
        f.write_str(name)
    }
}

/// One 1-D convolution over the laser scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvLayer {
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
}

impl ConvLayer {
    pub const fn new(out_channels: usize, kernel_size: usize, stride: usize) -> Self {
        Self {
            out_channels,
            kernel_size,
            stride,
        }
    }

    /// Output length for an input of `len` samples (no padding).
    pub fn output_len(&self, len: usize) -> usize {
        if len < self.kernel_size {
            0
        } else {
            (len - self.kernel_size) / self.stride + 1
        }
    }
}

/// How observations become the feature vector fed to the shared body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureExtractor {
    /// Observation used as-is.
    Flat,
    /// Convolutions over the scan part of the observation, projected to
    /// `features_dim` and concatenated with the remaining (goal) features.
    Conv {
        layers: Vec<ConvLayer>,
        features_dim: usize,
    },
}

/// Network family, mirroring the policy type an agent is trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyFamily {
    Mlp,
    Cnn,
}

/// Serializable actor-critic network recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyArchitecture {
    pub features: FeatureExtractor,
    /// Layers shared by policy and value function.
    pub body: Vec<usize>,
    /// Policy-only layers.
    pub pi: Vec<usize>,
    /// Value-only layers.
    pub vf: Vec<usize>,
    pub activation: Activation,
}

impl PolicyArchitecture {
    /// Plain MLP with the given layer split.
    pub fn mlp(body: &[usize], pi: &[usize], vf: &[usize], activation: Activation) -> Self {
        Self {
            features: FeatureExtractor::Flat,
            body: body.to_vec(),
            pi: pi.to_vec(),
            vf: vf.to_vec(),
            activation,
        }
    }

    /// Convolutional scan encoder followed by an MLP split.
    pub fn cnn(
        layers: &[ConvLayer],
        features_dim: usize,
        body: &[usize],
        pi: &[usize],
        vf: &[usize],
        activation: Activation,
    ) -> Self {
        Self {
            features: FeatureExtractor::Conv {
                layers: layers.to_vec(),
                features_dim,
            },
            body: body.to_vec(),
            pi: pi.to_vec(),
            vf: vf.to_vec(),
            activation,
        }
    }

    pub fn family(&self) -> PolicyFamily {
        match self.features {
            FeatureExtractor::Flat => PolicyFamily::Mlp,
            FeatureExtractor::Conv { .. } => PolicyFamily::Cnn,
        }
    }

    /// Check the recipe can be built for a scan of `scan_size` beams.
    pub fn validate(&self, scan_size: usize) -> Result<()> {
        if self.body.iter().chain(&self.pi).chain(&self.vf).any(|&n| n == 0) {
            return Err(Error::invalid("net_arch", "layer sizes must be positive"));
        }
        if let FeatureExtractor::Conv {
            layers,
            features_dim,
        } = &self.features
        {
            if *features_dim == 0 {
                return Err(Error::invalid("net_arch", "features_dim must be positive"));
            }
            let mut len = scan_size;
            for layer in layers {
                len = layer.output_len(len);
            }
            if len == 0 {
                return Err(Error::invalid(
                    "net_arch",
                    format!(
                        "convolutions reduce a scan of {} beams to nothing",
                        scan_size
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for PolicyArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.family() {
            PolicyFamily::Mlp => "MlpPolicy",
            PolicyFamily::Cnn => "CnnPolicy",
        };
        write!(
            f,
            "{} body={:?} pi={:?} vf={:?} act={}",
            family, self.body, self.pi, self.vf, self.activation
        )
    }
}

/// Parse a dash separated layer string such as `64-64`.
///
/// Empty segments are skipped, so `""` yields no layers.
pub fn parse_layers(param: &str, spec: &str) -> Result<Vec<usize>> {
    spec.split('-')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim().parse::<usize>().map_err(|_| {
                Error::invalid(param, format!("'{}' is not a layer size in '{}'", s, spec))
            })
        })
        .collect()
}
