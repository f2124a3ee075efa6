//! Actor-critic network built from a [`PolicyArchitecture`].

use burn::module::{Ignored, Module, Param};
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid, tanh};

use crate::agents::{Activation, FeatureExtractor, PolicyArchitecture};
use crate::env::ActionSpace;
use crate::error::{Error, Result};
use crate::nn::{OrthogonalLinear, OrthogonalLinearConfig, POLICY_HEAD_GAIN, VALUE_HEAD_GAIN};

/// Shapes a network is built for. Stored next to checkpoints.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NetworkShape {
    pub obs_size: usize,
    pub scan_size: usize,
    /// Discrete action count or continuous action dimension.
    pub n_outputs: usize,
    pub discrete: bool,
}

impl NetworkShape {
    pub fn new(obs_size: usize, scan_size: usize, action_space: &ActionSpace) -> Self {
        Self {
            obs_size,
            scan_size,
            n_outputs: action_space.n_outputs(),
            discrete: action_space.is_discrete(),
        }
    }
}

/// Forward pass result.
#[derive(Debug, Clone)]
pub struct PolicyOutput<B: Backend> {
    /// Logits `[batch, n_actions]` or Gaussian means `[batch, action_dim]`.
    pub action: Tensor<B, 2>,
    /// Log standard deviation `[batch, action_dim]` for continuous actions.
    pub log_std: Option<Tensor<B, 2>>,
    /// State values `[batch]`.
    pub values: Tensor<B, 1>,
}

/// Actor-critic with an optional convolutional scan encoder.
#[derive(Module, Debug)]
pub struct PolicyNet<B: Backend> {
    convs: Vec<Conv1d<B>>,
    scan_projection: Option<OrthogonalLinear<B>>,
    body: Vec<OrthogonalLinear<B>>,
    pi: Vec<OrthogonalLinear<B>>,
    vf: Vec<OrthogonalLinear<B>>,
    action_head: OrthogonalLinear<B>,
    value_head: OrthogonalLinear<B>,
    /// State-independent log std of continuous actions.
    log_std: Option<Param<Tensor<B, 1>>>,
    activation: Ignored<Activation>,
    obs_size: usize,
    scan_size: usize,
}

/// Stack of orthogonal layers starting at `d_input`; returns the layers and
/// the output width.
fn mlp<B: Backend>(
    d_input: usize,
    sizes: &[usize],
    gain: f64,
    device: &B::Device,
) -> (Vec<OrthogonalLinear<B>>, usize) {
    let mut width = d_input;
    let layers = sizes
        .iter()
        .map(|&size| {
            let layer = OrthogonalLinearConfig::new(width, size)
                .with_gain(gain)
                .init(device);
            width = size;
            layer
        })
        .collect();
    (layers, width)
}

impl<B: Backend> PolicyNet<B> {
    pub fn new(
        arch: &PolicyArchitecture,
        shape: &NetworkShape,
        device: &B::Device,
    ) -> Result<Self> {
        arch.validate(shape.scan_size)?;
        if shape.scan_size > shape.obs_size {
            return Err(Error::invalid(
                "observation",
                format!(
                    "scan of {} beams doesn't fit an observation of {} values",
                    shape.scan_size, shape.obs_size
                ),
            ));
        }
        if shape.n_outputs == 0 {
            return Err(Error::invalid("action_space", "no actions to choose from"));
        }
        let gain = arch.activation.gain();

        let (convs, scan_projection, features) = match &arch.features {
            FeatureExtractor::Flat => (Vec::new(), None, shape.obs_size),
            FeatureExtractor::Conv {
                layers,
                features_dim,
            } => {
                let mut channels = 1;
                let mut len = shape.scan_size;
                let mut convs = Vec::with_capacity(layers.len());
                for layer in layers {
                    convs.push(
                        Conv1dConfig::new(channels, layer.out_channels, layer.kernel_size)
                            .with_stride(layer.stride)
                            .init(device),
                    );
                    channels = layer.out_channels;
                    len = layer.output_len(len);
                }
                let projection = OrthogonalLinearConfig::new(channels * len, *features_dim)
                    .with_gain(gain)
                    .init(device);
                let rest = shape.obs_size - shape.scan_size;
                (convs, Some(projection), features_dim + rest)
            }
        };

        let (body, latent) = mlp(features, &arch.body, gain, device);
        let (pi, pi_out) = mlp(latent, &arch.pi, gain, device);
        let (vf, vf_out) = mlp(latent, &arch.vf, gain, device);

        let action_head = OrthogonalLinearConfig::new(pi_out, shape.n_outputs)
            .with_gain(POLICY_HEAD_GAIN)
            .init(device);
        let value_head = OrthogonalLinearConfig::new(vf_out, 1)
            .with_gain(VALUE_HEAD_GAIN)
            .init(device);
        let log_std = (!shape.discrete)
            .then(|| Param::from_tensor(Tensor::zeros([shape.n_outputs], device)));

        Ok(Self {
            convs,
            scan_projection,
            body,
            pi,
            vf,
            action_head,
            value_head,
            log_std,
            activation: Ignored(arch.activation),
            obs_size: shape.obs_size,
            scan_size: shape.scan_size,
        })
    }

    fn activate<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self.activation.0 {
            Activation::Relu => relu(x),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => tanh(x),
        }
    }

    fn features(&self, obs: Tensor<B, 2>) -> Tensor<B, 2> {
        let Some(projection) = &self.scan_projection else {
            return obs;
        };
        let [batch, _] = obs.dims();
        let mut x: Tensor<B, 3> = obs
            .clone()
            .slice([0..batch, 0..self.scan_size])
            .reshape([batch, 1, self.scan_size]);
        for conv in &self.convs {
            x = self.activate(conv.forward(x));
        }
        let scan = self.activate(projection.forward(x.flatten(1, 2)));
        if self.obs_size > self.scan_size {
            let rest = obs.slice([0..batch, self.scan_size..self.obs_size]);
            Tensor::cat(vec![scan, rest], 1)
        } else {
            scan
        }
    }

    fn run(&self, layers: &[OrthogonalLinear<B>], mut x: Tensor<B, 2>) -> Tensor<B, 2> {
        for layer in layers {
            x = self.activate(layer.forward(x));
        }
        x
    }

    /// Forward pass over `[batch, obs_size]` observations.
    pub fn forward(&self, obs: Tensor<B, 2>) -> PolicyOutput<B> {
        let [batch, _] = obs.dims();
        let latent = self.run(&self.body, self.features(obs));
        let action = self
            .action_head
            .forward(self.run(&self.pi, latent.clone()));
        let values = self
            .value_head
            .forward(self.run(&self.vf, latent))
            .reshape([batch]);
        let log_std = self.log_std.as_ref().map(|log_std| {
            log_std.val().unsqueeze_dim::<2>(0).repeat_dim(0, batch)
        });
        PolicyOutput {
            action,
            log_std,
            values,
        }
    }

    /// Value estimates only.
    pub fn values(&self, obs: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _] = obs.dims();
        let latent = self.run(&self.body, self.features(obs));
        self.value_head
            .forward(self.run(&self.vf, latent))
            .reshape([batch])
    }

    pub fn obs_size(&self) -> usize {
        self.obs_size
    }
}
