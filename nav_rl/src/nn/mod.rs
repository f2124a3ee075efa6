//! Neural network building blocks.

mod orthogonal;

pub use orthogonal::{
    orthogonal_matrix, OrthogonalLinear, OrthogonalLinearConfig, POLICY_HEAD_GAIN,
    VALUE_HEAD_GAIN,
};
