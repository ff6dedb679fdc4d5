//! Low-rank linear transform: project down, optionally normalize, project up.

use crate::error::Result;
use crate::modules::attention::check_probability;
use crate::modules::cursor::ChunkCursor;
use crate::modules::linear::{apply_layer_norm, apply_linear, empty_chunk, time_len, xavier_linear};
use crate::modules::transform::Transform;
use crate::perf::{self, Metric};
use crate::state::{Incremental, StreamingModule};
use crate::Error;
use burn::module::Module;
use burn::tensor::{backend::Backend, Bool, Tensor};
use burn_nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear};

/// Construction parameters for [`ProjectedLinear`].
#[derive(Debug, Clone)]
pub struct ProjectedLinearConfig {
    pub in_features: usize,
    pub out_features: usize,
    pub proj_features: usize,
    pub dropout: f64,
    pub layer_norm: bool,
    pub right_window: usize,
}

impl ProjectedLinearConfig {
    pub fn new(in_features: usize, out_features: usize, proj_features: usize) -> Self {
        Self {
            in_features,
            out_features,
            proj_features,
            dropout: 0.0,
            layer_norm: false,
            right_window: 0,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ProjectedLinear<B>> {
        if self.proj_features == 0 {
            return Err(Error::Config("proj_features must be at least 1".to_string()));
        }
        check_probability("dropout", self.dropout)?;
        let gain = if self.dropout > 0.0 {
            (1.0 - self.dropout).sqrt()
        } else {
            1.0
        };
        Ok(ProjectedLinear {
            linear1: xavier_linear(self.in_features, self.proj_features, 1.0, device),
            linear2: xavier_linear(self.proj_features, self.out_features, gain, device),
            layer_norm: self
                .layer_norm
                .then(|| LayerNormConfig::new(self.proj_features).init(device)),
            dropout: DropoutConfig::new(self.dropout).init(),
            out_features: self.out_features,
            right_window: self.right_window,
        })
    }
}

/// Two-layer bottleneck projection used when a cell has no attention.
#[derive(Module, Debug)]
pub struct ProjectedLinear<B: Backend> {
    pub linear1: Linear<B>,
    pub linear2: Linear<B>,
    pub layer_norm: Option<LayerNorm<B>>,
    pub dropout: Dropout,
    pub out_features: usize,
    pub right_window: usize,
}

/// Streaming cache of a [`ProjectedLinear`]: only the held-back projections.
#[derive(Debug, Clone)]
pub struct LinearState<B: Backend> {
    pub saved_query: Option<Tensor<B, 3>>,
}

impl<B: Backend> Default for LinearState<B> {
    fn default() -> Self {
        Self { saved_query: None }
    }
}

impl<B: Backend> LinearState<B> {
    pub fn held_len(&self) -> usize {
        time_len(self.saved_query.as_ref())
    }
}

impl<B: Backend> ProjectedLinear<B> {
    /// Transform a chunk. The linear transform is position-wise, so any
    /// attention mask is ignored; a pad mask is only rejected while streaming.
    pub fn forward(
        &self,
        input: Tensor<B, 3>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
        state: Incremental<LinearState<B>>,
    ) -> Result<(Tensor<B, 3>, Incremental<LinearState<B>>)> {
        let _span = perf::span(Metric::ProjectedForward);
        let [_, batch, _] = input.dims();
        let device = input.device();
        let query = apply_linear(&self.linear1, input);

        let (query, state) = match state {
            Incremental::Full => (query, None),
            Incremental::Streaming(mut state) => {
                if mask_pad.is_some() {
                    return Err(Error::PadMaskWhileStreaming);
                }
                let split = ChunkCursor::new(self.right_window).advance(state.saved_query.take(), query);
                state.saved_query = split.held;
                match split.ready {
                    Some(ready) => (ready, Some(state)),
                    None => {
                        let empty = empty_chunk(batch, self.out_features, &device);
                        return Ok((empty, Incremental::Streaming(state)));
                    }
                }
            }
        };

        let query = match &self.layer_norm {
            Some(norm) => apply_layer_norm(norm, query),
            None => query,
        };
        let output = apply_linear(&self.linear2, self.dropout.forward(query));
        Ok((output, state.into()))
    }
}

impl<B: Backend> StreamingModule<B> for ProjectedLinear<B> {
    type State = LinearState<B>;

    fn init_state(&self) -> Self::State {
        LinearState::default()
    }
}

impl<B: Backend> Transform<B> for ProjectedLinear<B> {
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
        _attn_mask: Option<Tensor<B, 2>>,
        state: Incremental<Self::State>,
    ) -> Result<(Tensor<B, 3>, Incremental<Self::State>)> {
        ProjectedLinear::forward(self, input, mask_pad, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::assert_close;
    use burn::tensor::Distribution;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn chunked_output_matches_full() {
        let device = NdArrayDevice::default();
        let config = ProjectedLinearConfig {
            layer_norm: true,
            right_window: 2,
            ..ProjectedLinearConfig::new(4, 6, 3)
        };
        let module = config.init::<TestBackend>(&device).unwrap();
        let input = Tensor::<TestBackend, 3>::random([8, 2, 4], Distribution::Default, &device);
        let (full, _) = module.forward(input.clone(), None, Incremental::Full).unwrap();

        let mut state = module.streaming();
        let mut outputs = Vec::new();
        let mut offset = 0;
        for (len, ready) in [(1, 0), (4, 3), (3, 3)] {
            let chunk = input.clone().narrow(0, offset, len);
            offset += len;
            let (output, next) = module.forward(chunk, None, state).unwrap();
            assert_eq!(output.dims()[0], ready);
            if ready > 0 {
                outputs.push(output);
            }
            state = next;
        }
        assert_eq!(state.as_state().unwrap().held_len(), 2);
        assert_close(
            &Tensor::cat(outputs, 0).into_data(),
            &full.narrow(0, 0, 6).into_data(),
            1e-5,
        );
    }

    #[test]
    fn dropout_out_of_range_is_rejected() {
        let device = NdArrayDevice::default();
        let config = ProjectedLinearConfig {
            dropout: 1.0,
            ..ProjectedLinearConfig::new(2, 2, 2)
        };
        assert!(matches!(
            config.init::<TestBackend>(&device),
            Err(Error::Config(_))
        ));
    }
}
