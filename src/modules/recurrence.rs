//! Elementwise gated recurrence of an SRU cell.
//!
//! Given the transform output `U` with `k` slices per hidden unit (candidate,
//! forget, reset and, for `k = 4`, a projected highway input) the recurrence
//! walks the time axis once, threading the carry `c` between steps:
//!
//! ```text
//! f  = sigmoid(U_f + v_f * c + b_f)
//! r  = sigmoid(U_r + v_r * c + b_r)
//! c' = f * c + (1 - f) * x~
//! h  = r * (c' * mask_c) + (1 - r) * x_hw
//! ```

use crate::perf::{self, Metric};
use burn::module::{Module, Param};
use burn::tensor::{activation::sigmoid, backend::Backend, Bool, Distribution, Tensor};

/// Learned peephole weights and gate biases of the recurrence.
#[derive(Module, Debug)]
pub struct Recurrence<B: Backend> {
    /// Peephole weights `[v_f; v_r]`, shape `[2 * hidden]`.
    pub weight_c: Param<Tensor<B, 1>>,
    /// Gate biases `[b_f; b_r]`, shape `[2 * hidden]`.
    pub bias: Param<Tensor<B, 1>>,
    pub hidden_size: usize,
    /// Number of `U` slices per hidden unit (3 or 4).
    pub num_matrices: usize,
    /// Multiplier on the identity highway input.
    pub scale_x: f32,
}

impl<B: Backend> Recurrence<B> {
    /// Create the recurrence parameters.
    ///
    /// The reset gate bias starts at `highway_bias`; with `rescale` and an
    /// identity highway the skip input is scaled by `sqrt(1 + 2 exp(highway_bias))`.
    pub fn new(
        hidden_size: usize,
        num_matrices: usize,
        highway_bias: f64,
        rescale: bool,
        device: &B::Device,
    ) -> Self {
        let weight_c = Tensor::random([2 * hidden_size], Distribution::Uniform(-0.5, 0.5), device);
        let bias = Tensor::cat(
            vec![
                Tensor::zeros([hidden_size], device),
                Tensor::full([hidden_size], highway_bias, device),
            ],
            0,
        );
        let scale_x = if rescale && num_matrices == 3 {
            (1.0 + 2.0 * highway_bias.exp()).sqrt() as f32
        } else {
            1.0
        };
        Self {
            weight_c: Param::from_tensor(weight_c),
            bias: Param::from_tensor(bias),
            hidden_size,
            num_matrices,
            scale_x,
        }
    }

    /// Run the recurrence over `u` of shape `(len, batch, hidden * k)`.
    ///
    /// `input` is the identity highway source `(len, batch, hidden)` and is
    /// ignored when `k = 4`. Padded steps (`mask_pad` true, shape `(len, batch)`)
    /// keep the carry and emit zeros. Returns `(hidden, carry)`.
    pub fn forward(
        &self,
        u: Tensor<B, 3>,
        input: Tensor<B, 3>,
        carry: Tensor<B, 2>,
        mask_c: Option<Tensor<B, 2>>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
    ) -> (Tensor<B, 3>, Tensor<B, 2>) {
        let _span = perf::span(Metric::CellRecurrence);
        let [len, batch, _] = u.dims();
        let hidden = self.hidden_size;
        let k = self.num_matrices;

        let u = u.reshape([len, batch, hidden, k]);
        let slice = |index: usize| u.clone().narrow(3, index, 1).reshape([len, batch, hidden]);
        let candidate = slice(0);
        let forget_in = slice(1);
        let reset_in = slice(2);
        let highway = if k == 4 {
            slice(3)
        } else {
            input.mul_scalar(self.scale_x)
        };

        let weight_c = self.weight_c.val();
        let bias = self.bias.val();
        let row = |tensor: Tensor<B, 1>, index: usize| {
            tensor.narrow(0, index * hidden, hidden).reshape([1, hidden])
        };
        let (v_f, v_r) = (row(weight_c.clone(), 0), row(weight_c, 1));
        let (b_f, b_r) = (row(bias.clone(), 0), row(bias, 1));

        let mut c = carry;
        let mut outputs = Vec::with_capacity(len);
        for t in 0..len {
            let step = |tensor: &Tensor<B, 3>| tensor.clone().narrow(0, t, 1).reshape([batch, hidden]);
            let f = sigmoid(step(&forget_in) + c.clone() * v_f.clone() + b_f.clone());
            let r = sigmoid(step(&reset_in) + c.clone() * v_r.clone() + b_r.clone());
            let next_c = f.clone() * c.clone() + f.neg().add_scalar(1.0) * step(&candidate);
            let gated = match &mask_c {
                Some(mask) => next_c.clone() * mask.clone(),
                None => next_c.clone(),
            };
            let h = r.clone() * gated + r.neg().add_scalar(1.0) * step(&highway);

            let (next_c, h) = match &mask_pad {
                Some(mask_pad) => {
                    let pad = mask_pad
                        .clone()
                        .narrow(0, t, 1)
                        .reshape([batch, 1])
                        .repeat_dim(1, hidden);
                    (next_c.mask_where(pad.clone(), c), h.mask_fill(pad, 0.0))
                }
                None => (next_c, h),
            };
            c = next_c;
            outputs.push(h.unsqueeze_dim::<3>(0));
        }

        (Tensor::cat(outputs, 0), c)
    }
}
