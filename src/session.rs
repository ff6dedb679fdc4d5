//! Per-utterance streaming driver for an encoder.
//!
//! A session owns the encoder state and the layer carries of one stream. The
//! caller pushes chunks as they arrive and drains the look-ahead once the
//! stream ends. Sessions borrow the encoder immutably, so any number of them
//! can run over the same parameters.

use crate::error::{Error, Result};
use crate::model::encoder::{EncoderState, SruppEncoder};
use crate::modules::linear::empty_chunk;
use crate::perf::{self, Metric};
use crate::state::{Incremental, StreamingModule};
use burn::tensor::{backend::Backend, Tensor};

/// Streaming state of one utterance.
#[derive(Debug)]
pub struct StreamingSession<'a, B: Backend> {
    encoder: &'a SruppEncoder<B>,
    state: Option<EncoderState<B>>,
    carries: Option<Vec<Tensor<B, 2>>>,
    batch: usize,
    device: B::Device,
    pushed: usize,
    emitted: usize,
    drained: bool,
}

impl<'a, B: Backend> StreamingSession<'a, B> {
    /// Start a session for `batch` parallel streams.
    pub fn new(encoder: &'a SruppEncoder<B>, batch: usize, device: &B::Device) -> Self {
        Self {
            encoder,
            state: Some(encoder.init_state()),
            carries: None,
            batch,
            device: device.clone(),
            pushed: 0,
            emitted: 0,
            drained: false,
        }
    }

    /// Feed one chunk `(len, batch, input_size)` and return the hidden states
    /// it released.
    pub fn push(&mut self, chunk: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        if self.drained {
            return Err(Error::SessionDrained);
        }
        let [len, batch, _] = chunk.dims();
        if batch != self.batch {
            return Err(Error::BatchMismatch {
                actual: batch,
                expected: self.batch,
            });
        }
        let hidden = self.step(chunk)?;
        self.pushed += len;
        perf::add_count(Metric::SessionChunks, 1);
        tracing::debug!(
            pushed = len,
            emitted = hidden.dims()[0],
            held = self.held_steps(),
            "session chunk"
        );
        Ok(hidden)
    }

    /// Release every held step by feeding trailing zero steps.
    ///
    /// After a drain the session has emitted one output per pushed step and
    /// accepts no further input.
    pub fn drain(&mut self) -> Result<Tensor<B, 3>> {
        let pad = self.encoder.total_right_window();
        self.drained = true;
        if pad == 0 || self.held_steps() == 0 {
            return Ok(empty_chunk(self.batch, self.encoder.hidden_size, &self.device));
        }
        let zeros = Tensor::zeros([pad, self.batch, self.encoder.input_size], &self.device);
        let hidden = self.step(zeros)?;
        tracing::debug!(released = hidden.dims()[0], "session drained");
        Ok(hidden)
    }

    /// Run one encoder call. State and carries are only replaced on success,
    /// so a rejected chunk leaves the session usable.
    fn step(&mut self, chunk: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let state = self
            .state
            .clone()
            .ok_or(Error::MissingSlot("encoder state"))?;
        let output = self.encoder.forward(
            chunk,
            self.carries.clone(),
            None,
            None,
            Incremental::Streaming(state),
        )?;
        self.state = output.state.into_state();
        self.carries = Some(output.carries);
        let released = output.hidden.dims()[0];
        self.emitted += released;
        Ok(output.hidden)
    }

    /// Steps pushed but not yet emitted by the top layer.
    pub fn held_steps(&self) -> usize {
        self.pushed.saturating_sub(self.emitted)
    }

    /// Steps emitted so far.
    pub fn emitted_steps(&self) -> usize {
        self.emitted
    }

    /// Steps pushed so far.
    pub fn pushed_steps(&self) -> usize {
        self.pushed
    }

    /// Layer carries after the last call, bottom first.
    pub fn carries(&self) -> Option<&[Tensor<B, 2>]> {
        self.carries.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::encoder::EncoderConfig;
    use burn::tensor::Distribution;
    use burn_ndarray::{NdArray, NdArrayDevice};

    type TestBackend = NdArray<f32>;

    #[test]
    fn drain_releases_every_pushed_step() {
        let device = NdArrayDevice::default();
        let encoder = EncoderConfig {
            right_window: 1,
            causal: true,
            ..EncoderConfig::new(2, 3, 4, 2)
        }
        .init::<TestBackend>(&device)
        .unwrap();
        let mut session = StreamingSession::new(&encoder, 2, &device);

        let mut emitted = 0;
        for len in [2, 3, 1] {
            let chunk = Tensor::<TestBackend, 3>::random([len, 2, 3], Distribution::Default, &device);
            emitted += session.push(chunk).unwrap().dims()[0];
        }
        assert_eq!(session.pushed_steps(), 6);
        assert_eq!(session.held_steps(), 2);
        assert_eq!(emitted, 4);

        let tail = session.drain().unwrap();
        assert_eq!(tail.dims(), [2, 2, 4]);
        assert_eq!(session.held_steps(), 0);
        assert_eq!(session.emitted_steps(), 6);
        assert_eq!(session.carries().map(<[_]>::len), Some(2));

        let chunk = Tensor::<TestBackend, 3>::zeros([1, 2, 3], &device);
        let err = session.push(chunk).unwrap_err();
        assert!(matches!(err, Error::SessionDrained));
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }

    #[test]
    fn batch_mismatch_is_rejected() {
        let device = NdArrayDevice::default();
        let encoder = EncoderConfig::new(1, 3, 4, 2)
            .init::<TestBackend>(&device)
            .unwrap();
        let mut session = StreamingSession::new(&encoder, 2, &device);
        let chunk = Tensor::<TestBackend, 3>::zeros([1, 3, 3], &device);
        assert!(matches!(
            session.push(chunk),
            Err(Error::BatchMismatch {
                actual: 3,
                expected: 2
            })
        ));
    }

    #[test]
    fn rejected_chunk_leaves_session_usable() {
        let device = NdArrayDevice::default();
        let encoder = EncoderConfig {
            right_window: 1,
            causal: true,
            ..EncoderConfig::new(2, 3, 4, 2)
        }
        .init::<TestBackend>(&device)
        .unwrap();
        let input = Tensor::<TestBackend, 3>::random([5, 1, 3], Distribution::Default, &device);

        let mut clean = StreamingSession::new(&encoder, 1, &device);
        let mut session = StreamingSession::new(&encoder, 1, &device);
        clean.push(input.clone().narrow(0, 0, 2)).unwrap();
        session.push(input.clone().narrow(0, 0, 2)).unwrap();

        let wide = Tensor::<TestBackend, 3>::zeros([2, 1, 5], &device);
        let err = session.push(wide).unwrap_err();
        assert!(matches!(err, Error::FeatureSize { actual: 5, expected: 3 }));
        assert_eq!(session.pushed_steps(), 2);

        let expected = clean.push(input.clone().narrow(0, 2, 3)).unwrap();
        let actual = session.push(input.narrow(0, 2, 3)).unwrap();
        assert_eq!(session.emitted_steps(), clean.emitted_steps());
        crate::test_util::assert_close(&actual.into_data(), &expected.into_data(), 0.0);
    }
}
