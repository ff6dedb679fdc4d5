//! Tensor helpers for `(time, batch, features)` chunks.
//!
//! Streaming calls regularly produce chunks with zero timesteps; these helpers
//! short-circuit on empty input instead of handing zero-sized tensors to the
//! backend kernels.

use crate::error::{Error, Result};
use burn::module::Param;
use burn::tensor::{backend::Backend, Distribution, Tensor, TensorData};
use burn_nn::{LayerNorm, Linear, LinearConfig};

/// Build a bias-free linear layer with Xavier-uniform weights scaled by `gain`.
pub fn xavier_linear<B: Backend>(
    in_features: usize,
    out_features: usize,
    gain: f64,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(in_features, out_features)
        .with_bias(false)
        .init::<B>(device);
    let bound = gain * (6.0 / (in_features + out_features) as f64).sqrt();
    let weight = Tensor::<B, 2>::random(
        [in_features, out_features],
        Distribution::Uniform(-bound, bound),
        device,
    );
    linear.weight = Param::from_tensor(weight);
    linear
}

/// Allocate a chunk with zero timesteps.
pub fn empty_chunk<B: Backend>(batch: usize, features: usize, device: &B::Device) -> Tensor<B, 3> {
    Tensor::zeros([0, batch, features], device)
}

/// Number of timesteps in an optional chunk.
pub fn time_len<B: Backend>(chunk: Option<&Tensor<B, 3>>) -> usize {
    chunk.map_or(0, |chunk| chunk.dims()[0])
}

/// Apply a linear layer to a `(time, batch, in)` chunk.
pub fn apply_linear<B: Backend>(linear: &Linear<B>, input: Tensor<B, 3>) -> Tensor<B, 3> {
    let [time, batch, in_dim] = input.dims();
    if time == 0 || batch == 0 || in_dim == 0 {
        let out_dim = linear.weight.val().dims()[1];
        return empty_chunk(batch, out_dim, &input.device());
    }
    linear.forward(input)
}

/// Apply layer normalization over the feature axis.
pub fn apply_layer_norm<B: Backend>(norm: &LayerNorm<B>, input: Tensor<B, 3>) -> Tensor<B, 3> {
    let [time, batch, dim] = input.dims();
    if time == 0 || batch == 0 || dim == 0 {
        return input;
    }
    norm.forward(input)
}

/// Split `(len, batch, heads * head_dim)` into `(batch * heads, len, head_dim)`.
///
/// Heads are laid out batch-major, so row `b * heads + h` is head `h` of item `b`.
pub fn split_heads<B: Backend>(input: Tensor<B, 3>, num_heads: usize) -> Tensor<B, 3> {
    let [len, batch, dim] = input.dims();
    let head_dim = dim / num_heads;
    input
        .reshape([len, batch * num_heads, head_dim])
        .swap_dims(0, 1)
}

/// Inverse of [`split_heads`].
pub fn merge_heads<B: Backend>(input: Tensor<B, 3>, batch: usize) -> Tensor<B, 3> {
    let [rows, len, head_dim] = input.dims();
    let heads = rows / batch;
    input.swap_dims(0, 1).reshape([len, batch, heads * head_dim])
}

/// Convert dynamically shaped data into a `(time, batch, features)` chunk.
pub fn chunk_from_data<B: Backend>(data: TensorData, device: &B::Device) -> Result<Tensor<B, 3>> {
    if data.shape.len() != 3 {
        return Err(Error::NotThreeDimensional(data.shape.to_vec()));
    }
    Ok(Tensor::from_data(data, device))
}
