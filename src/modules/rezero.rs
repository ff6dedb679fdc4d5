//! ReZero residual gate.
//!
//! A single learned scalar scales a sub-module's update before it is added to
//! the residual. Initialized near zero, the block starts close to identity.

use burn::module::{Module, Param};
use burn::tensor::{backend::Backend, Tensor, TensorData};

/// Configuration for creating a [`Rezero`] gate.
#[derive(Debug, Clone)]
pub struct RezeroConfig {
    /// Initial value of the scalar gate.
    pub init_value: f32,
}

impl RezeroConfig {
    /// Create a new config with the given init value.
    pub fn new(init_value: f32) -> Self {
        Self { init_value }
    }

    /// Initialize the gate on the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Rezero<B> {
        let data = TensorData::new(vec![self.init_value], [1]);
        Rezero {
            alpha: Param::from_tensor(Tensor::from_data(data, device)),
        }
    }
}

/// Learned scalar residual gate.
#[derive(Module, Debug)]
pub struct Rezero<B: Backend> {
    /// Gate value with shape `[1]`.
    pub alpha: Param<Tensor<B, 1>>,
}

impl<B: Backend> Rezero<B> {
    /// Compute `alpha * update + residual` for `(time, batch, dim)` tensors.
    pub fn apply(&self, update: Tensor<B, 3>, residual: Tensor<B, 3>) -> Tensor<B, 3> {
        let alpha = self.alpha.val().reshape([1, 1, 1]);
        update.mul(alpha).add(residual)
    }
}
