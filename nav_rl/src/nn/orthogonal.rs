//! Linear layers with orthogonal initialization.
//!
//! Policy and value networks start from orthogonal weight matrices scaled by
//! a gain that depends on the following activation (`sqrt(2)` for ReLU,
//! `5/3` for tanh). Output heads use small gains so the initial policy is
//! close to uniform and the initial value estimate close to zero.
//!
//! ```ignore
//! let layer: OrthogonalLinear<B> = OrthogonalLinearConfig::new(64, 32)
//!     .with_gain(std::f64::consts::SQRT_2)
//!     .init(&device);
//! let y = layer.forward(x);
//! ```

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::TensorData;

/// Gain for the action head.
pub const POLICY_HEAD_GAIN: f64 = 0.01;
/// Gain for the value head.
pub const VALUE_HEAD_GAIN: f64 = 1.0;

/// Configuration for [`OrthogonalLinear`].
#[derive(Debug, Clone)]
pub struct OrthogonalLinearConfig {
    pub d_input: usize,
    pub d_output: usize,
    /// Scale applied to the orthogonal matrix.
    pub gain: f64,
    pub bias: bool,
}

impl OrthogonalLinearConfig {
    pub fn new(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            gain: 1.0,
            bias: true,
        }
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> OrthogonalLinear<B> {
        let weights = orthogonal_matrix(self.d_output, self.d_input, self.gain);
        let weight = Tensor::from_data(
            TensorData::new(weights, [self.d_output, self.d_input]),
            device,
        );
        let bias = self
            .bias
            .then(|| Param::from_tensor(Tensor::zeros([self.d_output], device)));

        OrthogonalLinear {
            weight: Param::from_tensor(weight),
            bias,
            d_input: self.d_input,
            d_output: self.d_output,
        }
    }
}

/// Fully connected layer `y = x W^T + b` with orthogonal initial weights.
#[derive(Module, Debug)]
pub struct OrthogonalLinear<B: Backend> {
    /// Weight matrix `[d_output, d_input]`.
    pub weight: Param<Tensor<B, 2>>,
    pub bias: Option<Param<Tensor<B, 1>>>,
    d_input: usize,
    d_output: usize,
}

impl<B: Backend> OrthogonalLinear<B> {
    /// `[batch, d_input]` to `[batch, d_output]`.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let output = input.matmul(self.weight.val().transpose());
        match &self.bias {
            Some(bias) => output + bias.val().unsqueeze_dim(0),
            None => output,
        }
    }

    pub fn d_input(&self) -> usize {
        self.d_input
    }

    pub fn d_output(&self) -> usize {
        self.d_output
    }
}

/// Row-major `rows x cols` matrix with orthonormal rows (wide) or columns
/// (tall), scaled by `gain`.
///
/// Modified Gram-Schmidt over Gaussian vectors; degenerate vectors are
/// redrawn.
pub fn orthogonal_matrix(rows: usize, cols: usize, gain: f64) -> Vec<f32> {
    // Orthogonalize the shorter side's vectors, each of the longer length.
    let (n_vectors, len) = if rows >= cols { (cols, rows) } else { (rows, cols) };
    let mut vectors: Vec<Vec<f64>> = Vec::with_capacity(n_vectors);

    while vectors.len() < n_vectors {
        let mut v: Vec<f64> = (0..len).map(|_| standard_normal()).collect();
        for u in &vectors {
            let dot: f64 = v.iter().zip(u).map(|(a, b)| a * b).sum();
            v.iter_mut().zip(u).for_each(|(a, b)| *a -= dot * b);
        }
        let norm = v.iter().map(|a| a * a).sum::<f64>().sqrt();
        if norm > 1e-10 {
            v.iter_mut().for_each(|a| *a /= norm);
            vectors.push(v);
        }
    }

    let mut out = vec![0.0f32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            let value = if rows >= cols {
                vectors[c][r]
            } else {
                vectors[r][c]
            };
            out[r * cols + c] = (value * gain) as f32;
        }
    }
    out
}

/// Box-Muller sample from N(0, 1).
fn standard_normal() -> f64 {
    let u1 = fastrand::f64().max(f64::MIN_POSITIVE);
    let u2 = fastrand::f64();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
