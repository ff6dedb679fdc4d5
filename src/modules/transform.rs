//! Capability shared by the sub-modules that produce a cell's `U` projection.

use crate::error::{Error, Result};
use crate::modules::attention::{AttentionState, SruppAttention};
use crate::modules::projected::{LinearState, ProjectedLinear};
use crate::state::{Incremental, StreamingModule};
use burn::module::Module;
use burn::tensor::{backend::Backend, Bool, Tensor};

/// A sequence-to-sequence transform with chunked streaming support.
pub trait Transform<B: Backend>: StreamingModule<B> {
    /// Feature size of the produced chunk.
    fn out_features(&self) -> usize;

    /// Steps held back while streaming.
    fn right_window(&self) -> usize;

    /// Transform `input`, threading the streaming state through.
    fn forward(
        &self,
        input: Tensor<B, 3>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 2>>,
        state: Incremental<Self::State>,
    ) -> Result<(Tensor<B, 3>, Incremental<Self::State>)>;
}

/// The transform variants a cell can hold.
#[derive(Module, Debug)]
pub enum TransformModule<B: Backend> {
    Attention(SruppAttention<B>),
    Linear(ProjectedLinear<B>),
}

/// Streaming state of a [`TransformModule`].
#[derive(Debug, Clone)]
pub enum TransformState<B: Backend> {
    Attention(AttentionState<B>),
    Linear(LinearState<B>),
}

impl<B: Backend> TransformState<B> {
    fn variant(&self) -> &'static str {
        match self {
            TransformState::Attention(_) => "attention",
            TransformState::Linear(_) => "linear",
        }
    }

    /// Projected steps held back.
    pub fn held_len(&self) -> usize {
        match self {
            TransformState::Attention(state) => state.held_len(),
            TransformState::Linear(state) => state.held_len(),
        }
    }

    /// Keys cached by an attention transform; zero for the linear variant.
    pub fn seen_len(&self) -> usize {
        match self {
            TransformState::Attention(state) => state.seen_len(),
            TransformState::Linear(_) => 0,
        }
    }
}

impl<B: Backend> TransformModule<B> {
    fn variant(&self) -> &'static str {
        match self {
            TransformModule::Attention(_) => "attention",
            TransformModule::Linear(_) => "linear",
        }
    }

    /// True for the attention variant.
    pub fn has_attention(&self) -> bool {
        matches!(self, TransformModule::Attention(_))
    }
}

impl<B: Backend> StreamingModule<B> for TransformModule<B> {
    type State = TransformState<B>;

    fn init_state(&self) -> Self::State {
        match self {
            TransformModule::Attention(module) => TransformState::Attention(module.init_state()),
            TransformModule::Linear(module) => TransformState::Linear(module.init_state()),
        }
    }
}

impl<B: Backend> Transform<B> for TransformModule<B> {
    fn out_features(&self) -> usize {
        match self {
            TransformModule::Attention(module) => module.out_features,
            TransformModule::Linear(module) => module.out_features,
        }
    }

    fn right_window(&self) -> usize {
        match self {
            TransformModule::Attention(module) => module.right_window,
            TransformModule::Linear(module) => module.right_window,
        }
    }

    fn forward(
        &self,
        input: Tensor<B, 3>,
        mask_pad: Option<Tensor<B, 2, Bool>>,
        attn_mask: Option<Tensor<B, 2>>,
        state: Incremental<Self::State>,
    ) -> Result<(Tensor<B, 3>, Incremental<Self::State>)> {
        match (self, state) {
            (TransformModule::Attention(module), Incremental::Full) => {
                let (output, _) = module.forward(input, mask_pad, attn_mask, Incremental::Full)?;
                Ok((output, Incremental::Full))
            }
            (TransformModule::Linear(module), Incremental::Full) => {
                let (output, _) = module.forward(input, mask_pad, Incremental::Full)?;
                Ok((output, Incremental::Full))
            }
            (TransformModule::Attention(module), Incremental::Streaming(TransformState::Attention(state))) => {
                let (output, state) =
                    module.forward(input, mask_pad, attn_mask, Incremental::Streaming(state))?;
                Ok((output, state.map(TransformState::Attention)))
            }
            (TransformModule::Linear(module), Incremental::Streaming(TransformState::Linear(state))) => {
                let (output, state) = module.forward(input, mask_pad, Incremental::Streaming(state))?;
                Ok((output, state.map(TransformState::Linear)))
            }
            (module, Incremental::Streaming(state)) => Err(Error::StateMismatch {
                expected: module.variant(),
                found: state.variant(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::modules::attention::AttentionConfig;
    use crate::modules::projected::ProjectedLinearConfig;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn foreign_state_is_rejected() {
        let device = NdArrayDevice::default();
        let linear = TransformModule::Linear(
            ProjectedLinearConfig::new(2, 6, 2)
                .init::<TestBackend>(&device)
                .unwrap(),
        );
        let attention = TransformModule::Attention(
            AttentionConfig::new(2, 6, 2)
                .init::<TestBackend>(&device)
                .unwrap(),
        );
        let input = Tensor::<TestBackend, 3>::zeros([1, 1, 2], &device);
        let err = linear
            .forward(input, None, None, attention.streaming())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StateMismatch {
                expected: "linear",
                found: "attention"
            }
        ));
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }

    #[test]
    fn variants_report_capabilities() {
        let device = NdArrayDevice::default();
        let config = AttentionConfig {
            right_window: 3,
            ..AttentionConfig::new(2, 8, 4)
        };
        let module = TransformModule::Attention(config.init::<TestBackend>(&device).unwrap());
        assert!(module.has_attention());
        assert_eq!(module.out_features(), 8);
        assert_eq!(module.right_window(), 3);
        let state = module.init_state();
        assert_eq!(state.held_len(), 0);
        assert_eq!(state.seen_len(), 0);
    }
}
