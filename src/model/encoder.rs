//! Stack of SRU++ cells with per-layer streaming state and carries.

use crate::error::{Error, Result};
use crate::modules::cell::{CellConfig, CellState, SruppCell};
use crate::modules::mask::{causal_mask, streaming_causal_mask};
use crate::perf::{self, Metric};
use crate::state::{Incremental, StreamingModule};
use burn::module::Module;
use burn::tensor::{backend::Backend, Bool, Tensor};
use serde::{Deserialize, Serialize};

/// Encoder topology. Every field has a default so YAML files only need to
/// name what they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    pub num_layers: usize,
    pub input_size: usize,
    pub hidden_size: usize,
    pub projection_size: usize,
    pub num_heads: usize,
    pub dropout: f64,
    pub attn_dropout: f64,
    pub highway_bias: f64,
    pub layer_norm: bool,
    pub normalize_after: bool,
    /// Look-ahead of every layer.
    pub right_window: usize,
    /// Layer `i` uses attention when `(i + 1) % n == 0`; 0 disables attention.
    pub attn_every_n_layers: usize,
    pub rezero_init_alpha: f32,
    pub rescale: bool,
    /// Build causal attention masks internally.
    pub causal: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            num_layers: 2,
            input_size: 128,
            hidden_size: 128,
            projection_size: 32,
            num_heads: 1,
            dropout: 0.0,
            attn_dropout: 0.0,
            highway_bias: -2.0,
            layer_norm: true,
            normalize_after: true,
            right_window: 0,
            attn_every_n_layers: 1,
            rezero_init_alpha: 0.0,
            rescale: true,
            causal: false,
        }
    }
}

impl EncoderConfig {
    pub fn new(num_layers: usize, input_size: usize, hidden_size: usize, projection_size: usize) -> Self {
        Self {
            num_layers,
            input_size,
            hidden_size,
            projection_size,
            ..Self::default()
        }
    }

    /// Whether layer `index` gets the attention transform.
    pub fn layer_has_attention(&self, index: usize) -> bool {
        self.attn_every_n_layers > 0 && (index + 1) % self.attn_every_n_layers == 0
    }

    /// Cell configuration of layer `index`.
    pub fn cell_config(&self, index: usize) -> CellConfig {
        CellConfig {
            input_size: if index == 0 {
                self.input_size
            } else {
                self.hidden_size
            },
            hidden_size: self.hidden_size,
            projection_size: self.projection_size,
            num_heads: self.num_heads,
            dropout: self.dropout,
            attn_dropout: self.attn_dropout,
            highway_bias: self.highway_bias,
            layer_norm: self.layer_norm,
            normalize_after: self.normalize_after,
            has_attention: self.layer_has_attention(index),
            right_window: self.right_window,
            rezero_init_alpha: self.rezero_init_alpha,
            rescale: self.rescale,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SruppEncoder<B>> {
        if self.num_layers == 0 {
            return Err(Error::Config("num_layers must be at least 1".to_string()));
        }
        let layers = (0..self.num_layers)
            .map(|index| self.cell_config(index).init(device))
            .collect::<Result<Vec<_>>>()?;
        Ok(SruppEncoder {
            layers,
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            causal: self.causal,
        })
    }
}

/// Stacked SRU++ encoder.
#[derive(Module, Debug)]
pub struct SruppEncoder<B: Backend> {
    pub layers: Vec<SruppCell<B>>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub causal: bool,
}

/// Streaming state of every layer, bottom first.
#[derive(Debug, Clone)]
pub struct EncoderState<B: Backend> {
    pub layers: Vec<CellState<B>>,
}

/// Result of one encoder call.
#[derive(Debug, Clone)]
pub struct EncoderOutput<B: Backend> {
    /// Top layer hidden states `(ready, batch, hidden_size)`.
    pub hidden: Tensor<B, 3>,
    /// Final carry of every layer.
    pub carries: Vec<Tensor<B, 2>>,
    pub state: Incremental<EncoderState<B>>,
}

impl<B: Backend> SruppEncoder<B> {
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// End-to-end look-ahead: steps the top layer lags behind the input.
    pub fn total_right_window(&self) -> usize {
        self.layers.iter().map(SruppCell::right_window).sum()
    }

    /// Run every layer over one chunk `(len, batch, input_size)`.
    ///
    /// With `causal` set the caller's `attn_mask` is ignored and each
    /// attention layer gets a causal mask matching its cursor. Otherwise the
    /// caller's mask goes to every attention layer; while streaming, layers
    /// hold different cache lengths, so this is only accepted for a stack
    /// with at most one attention layer.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        carries: Option<Vec<Tensor<B, 2>>>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 2>>,
        state: Incremental<EncoderState<B>>,
    ) -> Result<EncoderOutput<B>> {
        let _span = perf::span(Metric::EncoderForward);
        let num_layers = self.layers.len();
        let mut carries: Vec<Option<Tensor<B, 2>>> = match carries {
            Some(carries) if carries.len() != num_layers => {
                return Err(Error::SlotLength {
                    slot: "carries",
                    actual: carries.len(),
                    expected: num_layers,
                });
            }
            Some(carries) => carries.into_iter().map(Some).collect(),
            None => vec![None; num_layers],
        };
        let mut states: Vec<Incremental<CellState<B>>> = match state {
            Incremental::Full => vec![Incremental::Full; num_layers],
            Incremental::Streaming(state) => {
                if state.layers.len() != num_layers {
                    return Err(Error::SlotLength {
                        slot: "layers",
                        actual: state.layers.len(),
                        expected: num_layers,
                    });
                }
                state.layers.into_iter().map(Incremental::Streaming).collect()
            }
        };

        let streaming = states.first().is_some_and(Incremental::is_streaming);
        if streaming && attn_mask.is_some() && !self.causal {
            let attention_layers = self.layers.iter().filter(|layer| layer.has_attention()).count();
            if attention_layers > 1 {
                return Err(Error::SharedMaskWhileStreaming { attention_layers });
            }
        }
        let device = input.device();
        let mut hidden = input;
        let mut next_carries = Vec::with_capacity(num_layers);
        let mut next_states = Vec::with_capacity(num_layers);
        for (index, layer) in self.layers.iter().enumerate() {
            let layer_state = std::mem::take(&mut states[index]);
            let incoming = hidden.dims()[0];
            let layer_mask = match (layer.has_attention(), self.causal) {
                (false, _) => None,
                (true, false) => attn_mask.clone(),
                (true, true) => match layer_state.as_state() {
                    Some(cache) => streaming_causal_mask(
                        cache.transform.seen_len(),
                        cache.transform.held_len(),
                        incoming,
                        layer.right_window(),
                        &device,
                    ),
                    None => (incoming > 0).then(|| causal_mask(incoming, incoming, 0, &device)),
                },
            };
            let output = layer.forward(
                hidden,
                carries[index].take(),
                mask_pad.clone(),
                layer_mask,
                layer_state,
            )?;
            tracing::trace!(
                layer = index,
                incoming,
                ready = output.hidden.dims()[0],
                "encoder layer"
            );
            hidden = output.hidden;
            next_carries.push(output.carry);
            if let Some(state) = output.state.into_state() {
                next_states.push(state);
            }
        }

        let state = if streaming {
            Incremental::Streaming(EncoderState {
                layers: next_states,
            })
        } else {
            Incremental::Full
        };
        Ok(EncoderOutput {
            hidden,
            carries: next_carries,
            state,
        })
    }
}

impl<B: Backend> StreamingModule<B> for SruppEncoder<B> {
    type State = EncoderState<B>;

    fn init_state(&self) -> Self::State {
        EncoderState {
            layers: self.layers.iter().map(|layer| layer.init_state()).collect(),
        }
    }
}
