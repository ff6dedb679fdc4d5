//! SRU++ recurrent cell: a transform produces `U`, the gated recurrence turns
//! it into hidden states.
//!
//! In streaming mode the transform holds back its last `right_window` steps.
//! The cell holds back the raw input steps by the same amount so the identity
//! highway stays aligned with the released part of `U`.

use crate::error::{Error, Result};
use crate::modules::attention::{check_probability, AttentionConfig};
use crate::modules::cursor::ChunkCursor;
use crate::modules::linear::{empty_chunk, time_len};
use crate::modules::projected::ProjectedLinearConfig;
use crate::modules::recurrence::Recurrence;
use crate::modules::transform::{Transform, TransformModule, TransformState};
use crate::perf::{self, Metric};
use crate::state::{Incremental, StreamingModule};
use burn::module::Module;
use burn::tensor::{backend::Backend, Bool, Tensor};
use burn_nn::{Dropout, DropoutConfig};
use serde::{Deserialize, Serialize};

/// Construction parameters for [`SruppCell`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CellConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    /// Bottleneck width of the transform.
    pub projection_size: usize,
    pub num_heads: usize,
    /// Variational dropout on the carry and transform dropout.
    pub dropout: f64,
    pub attn_dropout: f64,
    /// Initial reset gate bias.
    pub highway_bias: f64,
    pub layer_norm: bool,
    pub normalize_after: bool,
    /// Attention transform when true, projected linear otherwise.
    pub has_attention: bool,
    pub right_window: usize,
    pub rezero_init_alpha: f32,
    /// Scale the identity highway input.
    pub rescale: bool,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            input_size: 0,
            hidden_size: 0,
            projection_size: 0,
            num_heads: 1,
            dropout: 0.0,
            attn_dropout: 0.0,
            highway_bias: -2.0,
            layer_norm: true,
            normalize_after: true,
            has_attention: true,
            right_window: 0,
            rezero_init_alpha: 0.0,
            rescale: true,
        }
    }
}

impl CellConfig {
    pub fn new(input_size: usize, hidden_size: usize, projection_size: usize) -> Self {
        Self {
            input_size,
            hidden_size,
            projection_size,
            ..Self::default()
        }
    }

    /// Slices of `U` per hidden unit: 3 with an identity highway, 4 otherwise.
    pub fn num_matrices(&self) -> usize {
        if self.input_size == self.hidden_size {
            3
        } else {
            4
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SruppCell<B>> {
        if self.input_size == 0 || self.hidden_size == 0 {
            return Err(Error::Config(
                "input_size and hidden_size must be at least 1".to_string(),
            ));
        }
        check_probability("dropout", self.dropout)?;
        let out_features = self.hidden_size * self.num_matrices();
        let transform = if self.has_attention {
            let config = AttentionConfig {
                num_heads: self.num_heads,
                dropout: self.dropout,
                attn_dropout: self.attn_dropout,
                rezero_init_alpha: self.rezero_init_alpha,
                layer_norm: self.layer_norm,
                normalize_after: self.normalize_after,
                right_window: self.right_window,
                ..AttentionConfig::new(self.input_size, out_features, self.projection_size)
            };
            TransformModule::Attention(config.init(device)?)
        } else {
            let config = ProjectedLinearConfig {
                dropout: self.dropout,
                layer_norm: self.layer_norm,
                right_window: self.right_window,
                ..ProjectedLinearConfig::new(self.input_size, out_features, self.projection_size)
            };
            TransformModule::Linear(config.init(device)?)
        };
        Ok(SruppCell {
            transform,
            recurrence: Recurrence::new(
                self.hidden_size,
                self.num_matrices(),
                self.highway_bias,
                self.rescale,
                device,
            ),
            dropout: DropoutConfig::new(self.dropout).init(),
            input_size: self.input_size,
            hidden_size: self.hidden_size,
        })
    }
}

/// Recurrent cell wrapping a transform and the gated recurrence.
#[derive(Module, Debug)]
pub struct SruppCell<B: Backend> {
    pub transform: TransformModule<B>,
    pub recurrence: Recurrence<B>,
    /// Source of the per-call variational mask on the carry.
    pub dropout: Dropout,
    pub input_size: usize,
    pub hidden_size: usize,
}

/// Streaming state of a [`SruppCell`].
#[derive(Debug, Clone)]
pub struct CellState<B: Backend> {
    pub transform: TransformState<B>,
    /// Raw input steps held back alongside the transform's queries.
    pub saved_input: Option<Tensor<B, 3>>,
}

impl<B: Backend> CellState<B> {
    /// Input steps held back for look-ahead.
    pub fn held_len(&self) -> usize {
        time_len(self.saved_input.as_ref())
    }
}

/// Result of one cell call.
#[derive(Debug, Clone)]
pub struct CellOutput<B: Backend> {
    /// Hidden states `(ready, batch, hidden_size)`.
    pub hidden: Tensor<B, 3>,
    /// Final carry `(batch, hidden_size)`.
    pub carry: Tensor<B, 2>,
    pub state: Incremental<CellState<B>>,
}

impl<B: Backend> SruppCell<B> {
    pub fn has_attention(&self) -> bool {
        self.transform.has_attention()
    }

    pub fn right_window(&self) -> usize {
        self.transform.right_window()
    }

    /// Run the cell over one chunk `(len, batch, input_size)`.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        carry: Option<Tensor<B, 2>>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 2>>,
        state: Incremental<CellState<B>>,
    ) -> Result<CellOutput<B>> {
        let _span = perf::span(Metric::CellForward);
        let [len, batch, features] = input.dims();
        let device = input.device();

        if state.is_streaming() && mask_pad.is_some() {
            return Err(Error::PadMaskWhileStreaming);
        }
        if let Some(mask_pad) = &mask_pad {
            if mask_pad.dims() != [len, batch] {
                return Err(Error::PadMaskShape {
                    actual: mask_pad.dims(),
                    expected: [len, batch],
                });
            }
        }
        if features != self.input_size {
            return Err(Error::FeatureSize {
                actual: features,
                expected: self.input_size,
            });
        }
        let carry = match carry {
            Some(carry) if carry.dims() != [batch, self.hidden_size] => {
                return Err(Error::CarryShape {
                    actual: carry.dims(),
                    expected: [batch, self.hidden_size],
                });
            }
            Some(carry) => carry,
            None => Tensor::zeros([batch, self.hidden_size], &device),
        };

        let mask_c = (self.dropout.prob > 0.0)
            .then(|| self.dropout.forward(Tensor::ones([batch, self.hidden_size], &device)));

        let (u, input, state) = match state {
            Incremental::Full => {
                let (u, _) = self
                    .transform
                    .forward(input.clone(), mask_pad.clone(), attn_mask, Incremental::Full)?;
                (u, Some(input), None)
            }
            Incremental::Streaming(state) => {
                let (u, transform) = self.transform.forward(
                    input.clone(),
                    None,
                    attn_mask,
                    Incremental::Streaming(state.transform),
                )?;
                let transform = transform
                    .into_state()
                    .ok_or(Error::MissingSlot("transform"))?;
                let split = ChunkCursor::new(self.right_window()).advance(state.saved_input, input);
                let state = CellState {
                    transform,
                    saved_input: split.held,
                };
                (u, split.ready, Some(state))
            }
        };

        let ready = u.dims()[0];
        let input = match input {
            Some(input) if ready > 0 => input,
            _ => {
                return Ok(CellOutput {
                    hidden: empty_chunk(batch, self.hidden_size, &device),
                    carry,
                    state: state.into(),
                });
            }
        };
        let held = input.dims()[0];
        if held != ready {
            return Err(Error::SlotLength {
                slot: "saved_input",
                actual: held,
                expected: ready,
            });
        }

        let (hidden, carry) = self.recurrence.forward(u, input, carry, mask_c, mask_pad);
        Ok(CellOutput {
            hidden,
            carry,
            state: state.into(),
        })
    }
}

impl<B: Backend> StreamingModule<B> for SruppCell<B> {
    type State = CellState<B>;

    fn init_state(&self) -> Self::State {
        CellState {
            transform: self.transform.init_state(),
            saved_input: None,
        }
    }
}
