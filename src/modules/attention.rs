//! Self-attention transform with a look-ahead streaming cache.
//!
//! The module projects the input to queries, derives keys and values from the
//! queries, attends over every key seen so far, and gates the result into the
//! query residual with a ReZero scalar. In streaming mode queries pass through
//! a [`ChunkCursor`] first and key/value projections of released queries are
//! appended to a cache that only ever grows.

use crate::error::{Error, Result};
use crate::modules::cursor::ChunkCursor;
use crate::modules::linear::{
    apply_layer_norm, apply_linear, empty_chunk, merge_heads, split_heads, time_len,
    xavier_linear,
};
use crate::modules::rezero::{Rezero, RezeroConfig};
use crate::modules::transform::Transform;
use crate::perf::{self, Metric};
use crate::state::{Incremental, StreamingModule};
use burn::module::Module;
use burn::tensor::{activation::softmax, backend::Backend, Bool, Tensor};
use burn_nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear};

/// Construction parameters for [`SruppAttention`].
#[derive(Debug, Clone)]
pub struct AttentionConfig {
    /// Input feature size.
    pub in_features: usize,
    /// Output feature size.
    pub out_features: usize,
    /// Width of queries, keys and values.
    pub proj_features: usize,
    /// Number of attention heads; must divide `proj_features`.
    pub num_heads: usize,
    /// Dropout before the output projection.
    pub dropout: f64,
    /// Dropout on the attention weights.
    pub attn_dropout: f64,
    /// Initial ReZero gate value.
    pub rezero_init_alpha: f32,
    /// Enable layer normalization.
    pub layer_norm: bool,
    /// Normalize after the residual (post-norm) rather than before (pre-norm).
    pub normalize_after: bool,
    /// Steps held back in streaming mode.
    pub right_window: usize,
}

impl AttentionConfig {
    /// Config with one head, no dropout, no normalization and no look-ahead.
    pub fn new(in_features: usize, out_features: usize, proj_features: usize) -> Self {
        Self {
            in_features,
            out_features,
            proj_features,
            num_heads: 1,
            dropout: 0.0,
            attn_dropout: 0.0,
            rezero_init_alpha: 0.0,
            layer_norm: false,
            normalize_after: true,
            right_window: 0,
        }
    }

    /// Validate the topology and initialize the module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SruppAttention<B>> {
        if self.num_heads == 0 {
            return Err(Error::Config("num_heads must be at least 1".to_string()));
        }
        if self.proj_features % self.num_heads != 0 {
            return Err(Error::HeadsNotDivisible {
                proj_features: self.proj_features,
                num_heads: self.num_heads,
            });
        }
        check_probability("dropout", self.dropout)?;
        check_probability("attn_dropout", self.attn_dropout)?;

        let linear3_gain = if self.dropout > 0.0 {
            (1.0 - self.dropout).sqrt()
        } else {
            1.0
        };
        Ok(SruppAttention {
            linear1: xavier_linear(self.in_features, self.proj_features, 1.0, device),
            linear2: xavier_linear(self.proj_features, self.proj_features * 2, 1.0, device),
            linear3: xavier_linear(self.proj_features, self.out_features, linear3_gain, device),
            rezero: RezeroConfig::new(self.rezero_init_alpha).init(device),
            layer_norm: self
                .layer_norm
                .then(|| LayerNormConfig::new(self.proj_features).init(device)),
            dropout: DropoutConfig::new(self.dropout).init(),
            attn_dropout: DropoutConfig::new(self.attn_dropout).init(),
            proj_features: self.proj_features,
            out_features: self.out_features,
            num_heads: self.num_heads,
            normalize_after: self.normalize_after,
            right_window: self.right_window,
        })
    }
}

pub(crate) fn check_probability(name: &str, value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be in [0, 1), got {value}")))
    }
}

/// Multi-head self-attention transform.
#[derive(Module, Debug)]
pub struct SruppAttention<B: Backend> {
    /// Input to query projection.
    pub linear1: Linear<B>,
    /// Query to key/value projection (two halves).
    pub linear2: Linear<B>,
    /// Output projection.
    pub linear3: Linear<B>,
    pub rezero: Rezero<B>,
    pub layer_norm: Option<LayerNorm<B>>,
    pub dropout: Dropout,
    pub attn_dropout: Dropout,
    pub proj_features: usize,
    pub out_features: usize,
    pub num_heads: usize,
    pub normalize_after: bool,
    pub right_window: usize,
}

/// Streaming cache of an attention transform.
#[derive(Debug, Clone)]
pub struct AttentionState<B: Backend> {
    /// Projected queries waiting for look-ahead.
    pub saved_query: Option<Tensor<B, 3>>,
    /// Keys of every released query so far.
    pub saved_key: Option<Tensor<B, 3>>,
    /// Values of every released query so far.
    pub saved_value: Option<Tensor<B, 3>>,
}

impl<B: Backend> Default for AttentionState<B> {
    fn default() -> Self {
        Self {
            saved_query: None,
            saved_key: None,
            saved_value: None,
        }
    }
}

impl<B: Backend> AttentionState<B> {
    /// Queries currently held back.
    pub fn held_len(&self) -> usize {
        time_len(self.saved_query.as_ref())
    }

    /// Keys cached so far, which equals the number of released queries.
    pub fn seen_len(&self) -> usize {
        time_len(self.saved_key.as_ref())
    }

    /// Append new keys/values to the cache and return the full history.
    fn append_kv(
        &mut self,
        key: Tensor<B, 3>,
        value: Tensor<B, 3>,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        let _span = perf::span(Metric::AttentionAppendKv);
        let (key, value) = match (self.saved_key.take(), self.saved_value.take()) {
            (Some(saved_key), Some(saved_value)) => {
                let (key_len, value_len) = (saved_key.dims()[0], saved_value.dims()[0]);
                if key_len != value_len {
                    return Err(Error::SlotLength {
                        slot: "saved_value",
                        actual: value_len,
                        expected: key_len,
                    });
                }
                (
                    Tensor::cat(vec![saved_key, key], 0),
                    Tensor::cat(vec![saved_value, value], 0),
                )
            }
            (None, None) => (key, value),
            (Some(_), None) => return Err(Error::MissingSlot("saved_value")),
            (None, Some(_)) => return Err(Error::MissingSlot("saved_key")),
        };
        self.saved_key = Some(key.clone());
        self.saved_value = Some(value.clone());
        Ok((key, value))
    }
}

impl<B: Backend> SruppAttention<B> {
    fn head_dim(&self) -> usize {
        self.proj_features / self.num_heads
    }

    /// Transform a chunk, optionally through the streaming cache.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 2>>,
        state: Incremental<AttentionState<B>>,
    ) -> Result<(Tensor<B, 3>, Incremental<AttentionState<B>>)> {
        let _span = perf::span(Metric::AttentionForward);
        let [_, batch, _] = input.dims();
        let device = input.device();
        let projected = apply_linear(&self.linear1, input);

        let (query, attn_mask, mut state) = match state {
            Incremental::Full if projected.dims()[0] == 0 => {
                return Ok((empty_chunk(batch, self.out_features, &device), Incremental::Full));
            }
            Incremental::Full => (projected, attn_mask, None),
            Incremental::Streaming(mut state) => {
                if mask_pad.is_some() {
                    return Err(Error::PadMaskWhileStreaming);
                }
                let cursor = ChunkCursor::new(self.right_window);
                let split = cursor.advance(state.saved_query.take(), projected);
                let attn_mask = match (&split.ready, attn_mask) {
                    (Some(_), Some(mask)) => Some(cursor.align_mask(mask, &split)?),
                    _ => None,
                };
                let ready = split.ready;
                state.saved_query = split.held;
                match ready {
                    Some(ready) => (ready, attn_mask, Some(state)),
                    None => {
                        let empty = empty_chunk(batch, self.out_features, &device);
                        return Ok((empty, Incremental::Streaming(state)));
                    }
                }
            }
        };

        let residual = query.clone();
        let query = match &self.layer_norm {
            Some(norm) if !self.normalize_after => apply_layer_norm(norm, query),
            _ => query,
        };

        let key_value = apply_linear(&self.linear2, query.clone());
        let key = key_value.clone().narrow(2, 0, self.proj_features);
        let value = key_value.narrow(2, self.proj_features, self.proj_features);
        let (key, value) = match state.as_mut() {
            Some(state) => state.append_kv(key, value)?,
            None => (key, value),
        };

        let attended = self.attend(query, key, value, mask_pad, attn_mask)?;
        let output = self.rezero.apply(attended, residual);
        let output = match &self.layer_norm {
            Some(norm) if self.normalize_after => apply_layer_norm(norm, output),
            _ => output,
        };
        let output = apply_linear(&self.linear3, self.dropout.forward(output));

        Ok((output, state.into()))
    }

    /// Scaled dot-product attention of `query` over `key`/`value`.
    fn attend(
        &self,
        query: Tensor<B, 3>,
        key: Tensor<B, 3>,
        value: Tensor<B, 3>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 2>>,
    ) -> Result<Tensor<B, 3>> {
        let _span = perf::span(Metric::AttentionScores);
        let [tgt_len, batch, _] = query.dims();
        let src_len = key.dims()[0];
        let heads = self.num_heads;
        let scaling = (self.head_dim() as f64).powf(-0.5);

        let query = split_heads(query, heads).mul_scalar(scaling);
        let key = split_heads(key, heads);
        let value = split_heads(value, heads);

        // (bsz * num_heads, tgt_len, src_len)
        let mut scores = query.matmul(key.swap_dims(1, 2));

        if let Some(mask) = attn_mask {
            let dims = mask.dims();
            if dims != [tgt_len, src_len] {
                return Err(Error::AttnMaskShape {
                    actual: dims,
                    expected: [tgt_len, src_len],
                });
            }
            scores = scores.add(mask.unsqueeze_dim::<3>(0));
        }

        if let Some(mask_pad) = mask_pad {
            let dims = mask_pad.dims();
            if dims != [src_len, batch] {
                return Err(Error::PadMaskShape {
                    actual: dims,
                    expected: [src_len, batch],
                });
            }
            let mask = mask_pad
                .swap_dims(0, 1)
                .reshape([batch, 1, 1, src_len])
                .repeat_dim(1, heads)
                .repeat_dim(2, tgt_len);
            scores = scores
                .reshape([batch, heads, tgt_len, src_len])
                .mask_fill(mask, f32::NEG_INFINITY)
                .reshape([batch * heads, tgt_len, src_len]);
        }

        let weights = self.attn_dropout.forward(softmax(scores, 2));
        Ok(merge_heads(weights.matmul(value), batch))
    }
}

impl<B: Backend> StreamingModule<B> for SruppAttention<B> {
    type State = AttentionState<B>;

    fn init_state(&self) -> Self::State {
        AttentionState::default()
    }
}

impl<B: Backend> Transform<B> for SruppAttention<B> {
    fn out_features(&self) -> usize {
        self.out_features
    }

    fn right_window(&self) -> usize {
        self.right_window
    }

    fn forward(
        &self,
        input: Tensor<B, 3>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 2>>,
        state: Incremental<Self::State>,
    ) -> Result<(Tensor<B, 3>, Incremental<Self::State>)> {
        SruppAttention::forward(self, input, mask_pad, attn_mask, state)
    }
}
